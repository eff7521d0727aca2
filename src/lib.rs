//! # ESYBOT: Declarative Bot Runtime
//!
//! ESYBOT turns a declarative bot description into a running chat bot. A bot
//! is written once, in YAML, JSON or the sections dialect, and the runtime
//! takes care of dispatch, state and outbound messages.
//!
//! ## Loading
//!
//! ```text
//! raw bytes → dialect detection → normalization → validation → Declaration
//! ```
//!
//! The [`loader`] module detects the dialect and lowers every dialect into
//! one [`declaration::Declaration`]. Scalars are typed by [`value`].
//!
//! ## Handling events
//!
//! [`runtime::Runtime`] owns a session built from the declaration:
//! - Dispatch table ([`dispatch`]): inbound event → handler
//! - Per-event context ([`context`])
//! - Embedded scripts ([`script`]) on top of a small language ([`lang`])
//! - Conditions ([`condition`]) and `$name` substitution ([`template`])
//! - Effects ([`executor`]) with keyboards ([`keyboard`]) sent through the
//!   [`messenger::Messenger`] trait
//!
//! Variables live in a [`store::VariableStore`] shared by all of the above.
//! Failures after load are logged and recovered, see [`error`].

pub mod condition;
pub mod config;
pub mod context;
pub mod declaration;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod keyboard;
pub mod lang;
pub mod loader;
pub mod messenger;
pub mod runtime;
pub mod script;
pub mod store;
pub mod template;
pub mod value;

// Re-exports
pub use config::RuntimeConfig;
pub use context::{ContentType, EventContext, InboundEvent, MessageRef, Sender};
pub use declaration::*;
pub use error::*;
pub use loader::{load_declaration, load_declaration_file};
pub use messenger::{Messenger, OutboundMessage, RecordingMessenger};
pub use runtime::{Branch, Invocation, Runtime, RuntimeStats};
pub use store::VariableStore;
pub use value::{Value, parse_value};
