pub mod config;
pub mod models;
pub mod ports;
pub mod prompts;
pub mod routers;
pub mod service;
pub mod session;
pub mod tasks;
pub mod telemetry;
pub mod workflow;

pub use config::{ConfigError, ServiceConfig};
pub use models::*;
pub use service::{AppState, create_app};
pub use session::{ConsultationManager, SessionError};
pub use workflow::{
    Ports, WorkflowMode, build_diagnostic_workflow, create_case_session, create_flow_runner,
};
