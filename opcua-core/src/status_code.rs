use serde::{Deserialize, Serialize};
use std::fmt;

/// OPC UA status code
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
/// Only the codes used by this workspace are named; any other value is
/// still representable and is displayed by its hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusCode(u32);

macro_rules! status_codes {
    ($($name:ident = $value:literal, $text:literal;)*) => {
        impl StatusCode {
            $(pub const $name: StatusCode = StatusCode($value);)*

            /// Symbolic name of the code, if it is one of the named constants
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some($text),)*
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    GOOD = 0x0000_0000, "Good";
    UNCERTAIN_REFERENCE_NOT_DELETED = 0x40BC_0000, "UncertainReferenceNotDeleted";
    BAD_UNEXPECTED_ERROR = 0x8001_0000, "BadUnexpectedError";
    BAD_INTERNAL_ERROR = 0x8002_0000, "BadInternalError";
    BAD_COMMUNICATION_ERROR = 0x8005_0000, "BadCommunicationError";
    BAD_TIMEOUT = 0x800A_0000, "BadTimeout";
    BAD_SERVER_NOT_CONNECTED = 0x800D_0000, "BadServerNotConnected";
    BAD_SERVER_HALTED = 0x800E_0000, "BadServerHalted";
    BAD_NOTHING_TO_DO = 0x800F_0000, "BadNothingToDo";
    BAD_USER_ACCESS_DENIED = 0x801F_0000, "BadUserAccessDenied";
    BAD_IDENTITY_TOKEN_INVALID = 0x8020_0000, "BadIdentityTokenInvalid";
    BAD_IDENTITY_TOKEN_REJECTED = 0x8021_0000, "BadIdentityTokenRejected";
    BAD_SESSION_ID_INVALID = 0x8025_0000, "BadSessionIdInvalid";
    BAD_NODE_ID_INVALID = 0x8033_0000, "BadNodeIdInvalid";
    BAD_NODE_ID_UNKNOWN = 0x8034_0000, "BadNodeIdUnknown";
    BAD_ATTRIBUTE_ID_INVALID = 0x8035_0000, "BadAttributeIdInvalid";
    BAD_NOT_READABLE = 0x803A_0000, "BadNotReadable";
    BAD_NOT_WRITABLE = 0x803B_0000, "BadNotWritable";
    BAD_OUT_OF_RANGE = 0x803C_0000, "BadOutOfRange";
    BAD_NOT_SUPPORTED = 0x803D_0000, "BadNotSupported";
    BAD_NOT_FOUND = 0x803E_0000, "BadNotFound";
    BAD_NOT_IMPLEMENTED = 0x8040_0000, "BadNotImplemented";
    BAD_REFERENCE_TYPE_ID_INVALID = 0x804C_0000, "BadReferenceTypeIdInvalid";
    BAD_SERVER_URI_INVALID = 0x804F_0000, "BadServerUriInvalid";
    BAD_SERVER_NAME_MISSING = 0x8050_0000, "BadServerNameMissing";
    BAD_DISCOVERY_URL_MISSING = 0x8051_0000, "BadDiscoveryUrlMissing";
    BAD_TOO_MANY_SESSIONS = 0x8056_0000, "BadTooManySessions";
    BAD_PARENT_NODE_ID_INVALID = 0x805B_0000, "BadParentNodeIdInvalid";
    BAD_REFERENCE_NOT_ALLOWED = 0x805C_0000, "BadReferenceNotAllowed";
    BAD_NODE_ID_REJECTED = 0x805D_0000, "BadNodeIdRejected";
    BAD_NODE_ID_EXISTS = 0x805E_0000, "BadNodeIdExists";
    BAD_NODE_CLASS_INVALID = 0x805F_0000, "BadNodeClassInvalid";
    BAD_BROWSE_NAME_INVALID = 0x8060_0000, "BadBrowseNameInvalid";
    BAD_BROWSE_NAME_DUPLICATED = 0x8061_0000, "BadBrowseNameDuplicated";
    BAD_NODE_ATTRIBUTES_INVALID = 0x8062_0000, "BadNodeAttributesInvalid";
    BAD_TYPE_DEFINITION_INVALID = 0x8063_0000, "BadTypeDefinitionInvalid";
    BAD_SOURCE_NODE_ID_INVALID = 0x8064_0000, "BadSourceNodeIdInvalid";
    BAD_TARGET_NODE_ID_INVALID = 0x8065_0000, "BadTargetNodeIdInvalid";
    BAD_DUPLICATE_REFERENCE_NOT_ALLOWED = 0x8066_0000, "BadDuplicateReferenceNotAllowed";
    BAD_NO_MATCH = 0x806F_0000, "BadNoMatch";
    BAD_HISTORY_OPERATION_INVALID = 0x8071_0000, "BadHistoryOperationInvalid";
    BAD_HISTORY_OPERATION_UNSUPPORTED = 0x8072_0000, "BadHistoryOperationUnsupported";
    BAD_WRITE_NOT_SUPPORTED = 0x8073_0000, "BadWriteNotSupported";
    BAD_TYPE_MISMATCH = 0x8074_0000, "BadTypeMismatch";
    BAD_METHOD_INVALID = 0x8075_0000, "BadMethodInvalid";
    BAD_ARGUMENTS_MISSING = 0x8076_0000, "BadArgumentsMissing";
    BAD_ENTRY_EXISTS = 0x809F_0000, "BadEntryExists";
    BAD_NO_ENTRY_EXISTS = 0x80A0_0000, "BadNoEntryExists";
    BAD_INVALID_ARGUMENT = 0x80AB_0000, "BadInvalidArgument";
    BAD_SEMAPHORE_FILE_MISSING = 0x80AD_0000, "BadSemaphoreFileMissing";
    BAD_INVALID_STATE = 0x80AF_0000, "BadInvalidState";
    BAD_TOO_MANY_ARGUMENTS = 0x80E5_0000, "BadTooManyArguments";
    BAD_NOT_EXECUTABLE = 0x8111_0000, "BadNotExecutable";
}

impl StatusCode {
    const SEVERITY_MASK: u32 = 0xC000_0000;

    /// Create a status code from its raw value
    pub const fn from_bits(bits: u32) -> Self {
        StatusCode(bits)
    }

    /// Raw 32-bit value
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_good(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    #[must_use]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0x4000_0000
    }

    #[must_use]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(bits: u32) -> Self {
        StatusCode(bits)
    }
}
