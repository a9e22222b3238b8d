mod codec;
mod jar;

pub use codec::{CodecError, CodecMode, CredentialCodec, CredentialToken, StoredCredentials};
pub use jar::{
    CREDENTIALS_COOKIE_NAME, CredentialSource, credential_source, read_credentials,
    write_credentials,
};
