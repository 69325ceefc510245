//! Data models for the library server

pub mod book;
pub mod fee;
pub mod loan;
pub mod stats;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookDetails};
pub use fee::{Fee, FeeDetails, FinePolicy};
pub use loan::{BorrowRecord, LoanDetails, LoanStatus};
pub use user::{Access, Role, User, UserClaims};
