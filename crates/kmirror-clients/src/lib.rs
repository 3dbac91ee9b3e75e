//! # kmirror-clients
//!
//! Boundaries to the external services the platform talks to besides the
//! search backend:
//! - [`ForgeClient`]: repository hosting (repos, files, commits, diffs)
//! - [`ReferenceManager`]: bibliographic library (items, collections,
//!   tags, attachments) with `Total-Results` pagination
//!
//! Only the contracts, wire types, and the shared request logic live here.

pub mod error;
pub mod forge;
pub mod references;

pub use error::{ClientError, ClientResult};
pub use forge::{
    encode_file_content, Commit, CommitAuthor, CreateFileRequest, CreateRepoRequest, ForgeClient,
    Page, RepoOwner, Repository,
};
pub use references::{
    parse_total_results, Attachment, AttachmentFile, Collection, Creator, Item, ItemPage,
    ItemQueryOptions, ItemTag, ReferenceConfig, ReferenceManager,
};
