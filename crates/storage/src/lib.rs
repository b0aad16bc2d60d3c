#![forbid(unsafe_code)]

pub mod live;
pub mod namespace;
pub mod repository;
pub mod sqlite;

pub use live::{Listener, Listeners, Subscription};
pub use namespace::{Namespace, NamespaceError};
pub use repository::{
    InMemoryRepository, NewQuestionRecord, QuestionRepository, Storage, StorageError,
    VerificationPatch, VerificationRepository,
};
