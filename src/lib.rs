// SnapSplit - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod ocr;
pub mod rules;
pub mod session;
pub mod share;
pub mod stt;

// Re-export commonly used types
pub use auth::{AuthError, AuthService, User};
pub use config::AppConfig;
pub use db::{
    delete_receipt, get_profile, get_receipts_for_owner, insert_receipt, setup_database,
    upsert_profile, verify_count, Receipt, UserProfile,
};
pub use engine::{Assignment, Participant, ReceiptItem, ReceiptMeta, SplitError, SplitSession};
pub use ocr::{OcrClient, OcrError, ReceiptExtraction, CONFIDENCE_THRESHOLD};
pub use rules::{SmartSplitClient, SmartSplitError};
pub use session::{SessionError, SessionStore};
pub use share::{share_all_message, share_message};
pub use stt::{candidate_names, SttError, TranscriptionClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
