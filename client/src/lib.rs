pub mod backend;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod gateway;
pub mod mock;
pub mod workflow;

pub use backend::{Backend, BackendError, HttpBackend};
pub use gateway::{GatewayError, HttpGateway, PaymentGateway};
pub use workflow::{Workflow, WorkflowError, WorkflowState};
