//! Data model shared between the apply engine and its hosts.
//!
//! Everything here is plain serializable state: identifiers, the proposal
//! record and its lifecycle, diagnostics, line ranges and the derived
//! multi-file comparison rows. Behavior lives in `applique-core`.

pub mod diagnostic;
pub mod ids;
pub mod proposal;
pub mod range;
pub mod view;

pub use diagnostic::Diagnostic;
pub use diagnostic::DiagnosticSeverity;
pub use ids::MessageId;
pub use ids::ProposalId;
pub use ids::ToolCallId;
pub use ids::TurnId;
pub use proposal::ApplyResult;
pub use proposal::CodeEditProposal;
pub use proposal::ProposalStatus;
pub use range::LineRange;
pub use view::VersionedFileView;
