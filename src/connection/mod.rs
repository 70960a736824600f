//! Connection assembly for stored database profiles.
//!
//! Turns a profile from the metadata store into a dialect-specific
//! [`ConnectionDescriptor`], decrypting credentials on every call.

pub mod descriptor;

pub use descriptor::{
    ConnectionDescriptor, ConnectionOptions, DecryptedFields, Dialect, ExecutionPath,
    NetworkDescriptor, OracleDescriptor,
};

use crate::catalog::DatabaseProfile;
use crate::credentials::CredentialCodec;
use crate::error::Result;
use tracing::debug;

/// Builds a descriptor for the profile.
///
/// Fails with an unsupported-dialect error for unknown tags, before any
/// ciphertext is touched.
pub fn build_descriptor(
    profile: &DatabaseProfile,
    codec: &CredentialCodec,
    options: ConnectionOptions,
) -> Result<ConnectionDescriptor> {
    let dialect = Dialect::parse(&profile.database_type)?;
    let fields = DecryptedFields::decrypt(profile, dialect, codec)?;
    let descriptor = dialect.connection_descriptor(fields, profile.port, options)?;

    debug!(
        "Built {} for database \"{}\"",
        descriptor.display_string(),
        profile.name
    );
    Ok(descriptor)
}
