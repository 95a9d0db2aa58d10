//! # API Gateway
//!
//! The HTTP surface of the core:
//!
//! - `POST /api/v1/hpc/nodes/register` - node agent registration
//! - `POST /api/v1/hpc/nodes/{nodeId}/heartbeat` - signed heartbeat
//! - `POST /api/v1/hpc/nodes/{nodeId}/metrics` - metric batches
//! - `POST /api/v1/hpc/jobs` / `GET /api/v1/hpc/jobs/{jobId}` - jobs
//! - `POST /api/v1/callbacks/lifecycle` - provider callbacks
//! - `GET /metrics` - Prometheus exposition
//!
//! Node-agent endpoints authenticate with a signature over the request body
//! under the node's registered key; callback endpoints require the
//! provider-level signature. Errors translate per the shared taxonomy.

pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use handlers::callbacks::{CallbackEvent, LifecycleCallback, PROVIDER_SIGNATURE_HEADER};
pub use handlers::nodes::SIGNATURE_HEADER;
pub use router::{build_router, AppState};
