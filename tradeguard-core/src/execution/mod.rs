//! Execution simulation: cost model, arrival VWAP benchmark, order-flow
//! meter and the simulator that turns decisions into fills.

pub mod cost_model;
pub mod simulator;
pub mod tick_flow;
pub mod vwap;

pub use cost_model::{BpsCostModel, CostModel};
pub use simulator::{ExecutionSimulator, MarketSnapshot, Rejection};
pub use tick_flow::{FlowError, TickFlowMeter};
pub use vwap::ArrivalVwap;
