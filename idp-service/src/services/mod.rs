//! Core of the identity provider.
//!
//! Everything here is transport-agnostic; the HTTP layer in `handlers`
//! only decodes requests and renders the results.

pub mod audit;
pub mod bootstrap;
pub mod credential;
pub mod database;
pub mod device;
pub mod error;
pub mod grant;
pub mod jwt;
pub mod login;
pub mod reaper;
pub mod role;
pub mod sso;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use credential::CredentialService;
pub use database::{Database, PurgeReport, RoleKind, Transaction};
pub use device::{DeviceAuthorization, DeviceService};
pub use error::{ErrorKind, ResultExt, ServiceError};
pub use grant::{GrantRequest, GrantService, TokenResponse};
pub use login::{LoginOutcome, LoginResponse, LoginService};
pub use reaper::{Reaper, ReaperHandle};
pub use role::RoleCatalog;
pub use sso::{AuthorizeOutcome, SsoService, SSO_COOKIE_NAME};
