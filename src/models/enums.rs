use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AppointmentState {
    Created => "created",
    Responded => "responded",
    Urged => "urged",
    Processed => "processed",
    Deleted => "deleted",
});

str_enum!(Transition {
    Respond => "respond",
    Urge => "urge",
    ResolveUrge => "resolve_urge",
    SetPriority => "set_priority",
    Process => "process",
    Delete => "delete",
    Edit => "edit",
});

str_enum!(NotificationKind {
    Responded => "responded",
    Processed => "processed",
    UrgeProcessed => "urge_processed",
    ProfileReplied => "profile_replied",
});

str_enum!(RecordType {
    User => "user",
    DoctorPublic => "doctor_public",
    DoctorPrivate => "doctor_private",
});

impl RecordType {
    /// Guest-written notes and public doctor replies; private doctor notes stay hidden.
    pub fn is_visible_to_guest(self) -> bool {
        !matches!(self, Self::DoctorPrivate)
    }
}

impl AppointmentState {
    /// Responded and neither processed nor deleted: the appointment belongs in the queue.
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Responded | Self::Urged)
    }

    /// States whose presence or absence the processing queue must reflect.
    pub fn is_queue_relevant(self) -> bool {
        self.is_eligible() || matches!(self, Self::Processed | Self::Deleted)
    }

    /// Resulting state of `transition`, or `None` when the move is illegal.
    pub fn apply(self, transition: Transition) -> Option<Self> {
        use AppointmentState::*;
        match (self, transition) {
            (Created, Transition::Respond) => Some(Responded),
            (Responded, Transition::Urge) => Some(Urged),
            (Urged, Transition::ResolveUrge) => Some(Responded),
            (Created | Responded | Urged, Transition::SetPriority | Transition::Edit) => Some(self),
            (Created | Responded | Urged, Transition::Process) => Some(Processed),
            (Created | Responded | Urged | Processed, Transition::Delete) => Some(Deleted),
            _ => None,
        }
    }
}
