//! Bulkcast: bulk email and SMS dispatch.
//!
//! Sends one templated message to a recipient list through an
//! interchangeable vendor adapter, with throttling, bounded retries and a
//! per-recipient outcome report.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod ledger;
pub mod logging;
pub mod providers;
pub mod recipient;
pub mod template;

pub use dispatch::report::{DispatchReport, DispatchSummary};
pub use dispatch::{DispatchError, DispatchOptions, DispatchRequest, Dispatcher};
pub use providers::router::{ProviderRouter, RouterError};
pub use providers::{DeliveryProvider, OutboundMessage, ProviderError, SendOutcome};
pub use recipient::Channel;
pub use template::{MessageTemplate, TemplateVars};
