// docsession - server-side HTTP sessions stored in a document database
//
// The client holds only an identifier cookie; the session contents live in a
// per-application collection and are loaded and saved around each request.

// Re-export core functionality
pub use docsession_core::*;

// Re-export optional crates
#[cfg(feature = "log")]
pub use docsession_log as log;

/// Prelude for common imports.
///
/// ```
/// use docsession::prelude::*;
/// ```
pub mod prelude {
    pub use docsession_core::prelude::*;

    #[cfg(feature = "log")]
    pub use docsession_log::{LogConfig, init as init_logging};
}
