//! Splat Node - a local compute node for 3D Gaussian-splat reconstruction
//!
//! The node polls a shared task list hosted on a Hugging Face dataset repo,
//! processes every task marked `processing` (download image, run the
//! external `sharp` reconstruction tool, upload the `.ply` model), and
//! writes the updated statuses back. All the heavy lifting happens in the
//! external tool; this crate is the glue around it.
//!
//! The crate also ships `vertex-proxy`, a small HTTP proxy that forwards
//! browser requests to Vertex AI with an ambient GCP credential attached
//! (see [`proxy`]).

pub mod error;
pub mod hub;
pub mod proxy;
pub mod reconstruct;
pub mod tasks;
pub mod worker;

pub use error::{Result, SplatError};
pub use hub::{HubClient, HubConfig, RemoteStore};
pub use reconstruct::{Reconstructor, SharpCommand};
pub use tasks::{Task, TaskId, TaskList, TaskStatus};
