use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    File,
    Block,
    Dataset,
    Site,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::File => write!(f, "file"),
            ResourceType::Block => write!(f, "block"),
            ResourceType::Dataset => write!(f, "dataset"),
            ResourceType::Site => write!(f, "site"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfndbErrorCode {
    Decode,
    Validation,
    IntegrityError,
    FileAlreadyExists,
    BlockAlreadyExists,
    DatasetAlreadyExists,
    SiteAlreadyExists,
    FileNotFound,
    BlockNotFound,
    DatasetNotFound,
    SiteNotFound,
    TransientStore,
}

impl LfndbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            LfndbErrorCode::Decode => "decode",
            LfndbErrorCode::Validation => "validation",
            LfndbErrorCode::IntegrityError => "integrity_error",
            LfndbErrorCode::FileAlreadyExists => "file_already_exists",
            LfndbErrorCode::BlockAlreadyExists => "block_already_exists",
            LfndbErrorCode::DatasetAlreadyExists => "dataset_already_exists",
            LfndbErrorCode::SiteAlreadyExists => "site_already_exists",
            LfndbErrorCode::FileNotFound => "file_not_found",
            LfndbErrorCode::BlockNotFound => "block_not_found",
            LfndbErrorCode::DatasetNotFound => "dataset_not_found",
            LfndbErrorCode::SiteNotFound => "site_not_found",
            LfndbErrorCode::TransientStore => "transient_store",
        }
    }
}

#[derive(Debug, Error)]
pub enum LfndbError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("integrity error: {message}")]
    IntegrityError { message: String },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("transient store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl LfndbError {
    pub fn code(&self) -> LfndbErrorCode {
        match self {
            LfndbError::Decode(_) => LfndbErrorCode::Decode,
            LfndbError::Validation(_) => LfndbErrorCode::Validation,
            LfndbError::IntegrityError { .. } => LfndbErrorCode::IntegrityError,
            LfndbError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::File => LfndbErrorCode::FileAlreadyExists,
                ResourceType::Block => LfndbErrorCode::BlockAlreadyExists,
                ResourceType::Dataset => LfndbErrorCode::DatasetAlreadyExists,
                ResourceType::Site => LfndbErrorCode::SiteAlreadyExists,
            },
            LfndbError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::File => LfndbErrorCode::FileNotFound,
                ResourceType::Block => LfndbErrorCode::BlockNotFound,
                ResourceType::Dataset => LfndbErrorCode::DatasetNotFound,
                ResourceType::Site => LfndbErrorCode::SiteNotFound,
            },
            LfndbError::Store(_) => LfndbErrorCode::TransientStore,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

/// True when the underlying store rejected an insert because a unique key or
/// primary key already holds the value.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::{LfndbError, LfndbErrorCode, ResourceType};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(LfndbErrorCode::FileNotFound.as_str(), "file_not_found");
        assert_eq!(
            LfndbErrorCode::FileAlreadyExists.as_str(),
            "file_already_exists"
        );
        assert_eq!(LfndbErrorCode::TransientStore.as_str(), "transient_store");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = LfndbError::NotFound {
            resource_type: ResourceType::Block,
            resource_id: "block-123".into(),
        };
        assert_eq!(err.code(), LfndbErrorCode::BlockNotFound);
        assert_eq!(err.code_str(), "block_not_found");
    }

    #[test]
    fn validation_maps_to_validation_code() {
        let err = LfndbError::Validation("dataset path must be set".into());
        assert_eq!(err.code(), LfndbErrorCode::Validation);
        assert_eq!(err.code_str(), "validation");
    }
}
