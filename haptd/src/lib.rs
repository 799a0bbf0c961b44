//! Headless front end for the haptic router: subscribes to the core's
//! event stream and renders it as structured log output. Stands in for
//! the interactive control surface on builds that run unattended
//! (e.g. a router box next to the vest's charging dock).

pub mod event;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HaptdError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Router Error")]
    RouterError(#[from] hapt_router::RouterError),
    #[error("Actix mailbox Error")]
    MailError(#[from] actix::MailboxError),
    #[error("Event Handling Error")]
    EventError,
}
