//! Classification of driver errors into [`KvStoreError`] kinds.

use std::io::ErrorKind as IoErrorKind;

use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};

use kvlayer_core::error::KvStoreError;

/// Server code for an operator applied to a value of the wrong type.
const TYPE_MISMATCH: i32 = 14;
/// Server code for a failed authentication.
const AUTHENTICATION_FAILED: i32 = 18;
/// Server code for an operation exceeding its time limit.
const MAX_TIME_MS_EXPIRED: i32 = 50;

/// The server error code carried by a command or write failure.
fn server_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    }
}

fn is_authentication(err: &MongoError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Authentication { .. })
        || server_code(err) == Some(AUTHENTICATION_FAILED)
}

fn is_timeout(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Io(io) => matches!(io.kind(), IoErrorKind::TimedOut | IoErrorKind::WouldBlock),
        ErrorKind::ServerSelection { .. } => true,
        _ => server_code(err) == Some(MAX_TIME_MS_EXPIRED),
    }
}

/// Maps an error raised while connecting or authenticating.
pub(crate) fn startup_error(err: MongoError) -> KvStoreError {
    if is_authentication(&err) {
        KvStoreError::Authentication(err.to_string())
    } else {
        KvStoreError::Connection(err.to_string())
    }
}

/// Maps an error raised by a structure or session operation.
pub(crate) fn operation_error(err: MongoError) -> KvStoreError {
    if is_timeout(&err) {
        KvStoreError::Timeout(err.to_string())
    } else {
        KvStoreError::Operation(err.to_string())
    }
}

/// Maps an error raised by an increment of `key`. The server rejects `$inc` on a
/// non-numeric value with a type mismatch.
pub(crate) fn increment_error(key: &str, err: MongoError) -> KvStoreError {
    if server_code(&err) == Some(TYPE_MISMATCH) {
        KvStoreError::InvalidValue(key.to_string(), err.to_string())
    } else {
        operation_error(err)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use mongodb::error::{CommandError, WriteError};

    use super::*;

    fn command_error(code: i32, name: &str) -> MongoError {
        let command: CommandError = bson::deserialize_from_document(doc! {
            "code": code,
            "codeName": name,
            "errmsg": format!("{} failure", name),
        })
        .unwrap();

        MongoError::from(ErrorKind::Command(command))
    }

    fn write_error(code: i32) -> MongoError {
        let write: WriteError = bson::deserialize_from_document(doc! {
            "code": code,
            "errmsg": "Cannot apply $inc to a value of non-numeric type",
        })
        .unwrap();

        MongoError::from(ErrorKind::Write(WriteFailure::WriteError(write)))
    }

    #[tokio::test]
    async fn invalid_arguments_are_plain_errors() {
        let err = mongodb::options::ClientOptions::parse("postgres://localhost")
            .await
            .unwrap_err();

        assert!(matches!(operation_error(err.clone()), KvStoreError::Operation(_)));
        assert!(matches!(startup_error(err), KvStoreError::Connection(_)));
    }

    #[test]
    fn rejected_credentials_are_fatal() {
        let err = startup_error(command_error(AUTHENTICATION_FAILED, "AuthenticationFailed"));

        assert!(matches!(err, KvStoreError::Authentication(_)));
        assert!(err.is_fatal());
        assert!(err.is_startup());
    }

    #[test]
    fn other_startup_failures_are_connection_errors() {
        let err = startup_error(command_error(13, "Unauthorized"));

        assert!(matches!(err, KvStoreError::Connection(_)));
    }

    #[test]
    fn time_limits_are_timeouts() {
        let err = operation_error(command_error(MAX_TIME_MS_EXPIRED, "MaxTimeMSExpired"));

        assert!(matches!(err, KvStoreError::Timeout(_)));
    }

    #[test]
    fn non_numeric_increments_are_invalid_values() {
        assert!(matches!(
            increment_error("user:1", write_error(TYPE_MISMATCH)),
            KvStoreError::InvalidValue(key, _) if key == "user:1"
        ));
        assert!(matches!(
            increment_error("user:1", command_error(TYPE_MISMATCH, "TypeMismatch")),
            KvStoreError::InvalidValue(..)
        ));
        assert!(matches!(
            increment_error("user:1", command_error(2, "BadValue")),
            KvStoreError::Operation(_)
        ));
    }
}
