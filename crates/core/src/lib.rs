pub mod calculator;
pub mod config;
pub mod domain;
pub mod errors;

pub use calculator::{evaluate, format_number, CalcError};
pub use domain::message::{Message, Role};
pub use domain::outlet::Outlet;
pub use domain::product::ProductDocument;
pub use domain::tool::{ToolDescriptor, ToolInvocation};
pub use errors::{AgentError, InterfaceError};
