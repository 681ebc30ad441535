//! Mail model shared by the pipeline and the transports.

pub mod message;

pub use message::{
    ASC_SUFFIX, Alternative, AttachmentRef, ENCRYPTED_MIMETYPE, Message, ResolvedAttachment,
};
