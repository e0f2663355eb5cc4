// Library root
// -----------
// The binary (`main.rs`) is a thin shell over these modules.
//
// Module responsibilities:
// - `record`, `button`, `dispatch`: the flow buttons. Resolve the records a
//   button was pressed on, confirm, post each one to a flow's HTTP trigger and
//   report the outcome through a `HostUi`.
// - `config_store`, `session`, `localization`: configuration values, their
//   per-session caches, and user-facing strings.
// - `api`: HTTP interactions with the Dataverse Web API.
// - `admin`: the tenant inventory tool.
// - `ui`: the terminal host and interactive menu.
pub mod admin;
pub mod api;
pub mod button;
pub mod config_store;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod localization;
pub mod record;
pub mod session;
pub mod settings;
pub mod ui;

pub use error::{FlowError, Result};
