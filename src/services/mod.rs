pub mod backend;
pub mod dispatcher;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod regions;
pub mod reporter;
pub mod store;
pub mod trace_log;
pub mod validation;
pub mod worker;
