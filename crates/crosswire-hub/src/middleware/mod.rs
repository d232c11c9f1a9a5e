//! Middleware: registries, parameter plans, the pipeline engine, and the
//! wrap (onion) chain around local handler dispatch.

pub mod param;
pub mod pipeline;
pub mod registry;
pub mod wrap;

pub use param::{ParamPlan, ParamSlot};
pub use pipeline::{MwConfig, MwCtx};
pub use registry::{
    mw_fn, Middleware, MwEntry, MwLocation, MwRegistry, SharedRegistries,
};
pub use wrap::{Next, Terminal, WrapEntry, WrapInterceptor, WrapRegistry};
