//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Lookup-table name of this status.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Map a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Hosted website lifecycle status.
    WebsiteStatus {
        Pending = 1 => "pending",
        Provisioning = 2 => "provisioning",
        Active = 3 => "active",
        Deprovisioning = 4 => "deprovisioning",
        Suspended = 5 => "suspended",
        Error = 6 => "error",
    }
}

impl WebsiteStatus {
    /// Statuses in which another lifecycle operation must not start.
    pub fn is_transitional(self) -> bool {
        matches!(self, WebsiteStatus::Provisioning | WebsiteStatus::Deprovisioning)
    }
}

define_status_enum! {
    /// Certificate status, independent of the site status.
    SslStatus {
        None = 1 => "none",
        Pending = 2 => "pending",
        Active = 3 => "active",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Outcome of a cron job's latest run.
    CronRunStatus {
        Pending = 1 => "pending",
        Running = 2 => "running",
        Success = 3 => "success",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Site backup status. A backup's file exists iff it is `Completed`.
    BackupStatus {
        Pending = 1 => "pending",
        InProgress = 2 => "in_progress",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Queued orchestration operation status.
    OperationStatus {
        Pending = 1 => "pending",
        Running = 2 => "running",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Cancelled = 5 => "cancelled",
    }
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

define_status_enum! {
    /// Hosting server health from the last check.
    ServerHealth {
        Unknown = 1 => "unknown",
        Healthy = 2 => "healthy",
        Unhealthy = 3 => "unhealthy",
    }
}

define_status_enum! {
    /// Outcome of a git deployment.
    DeploymentStatus {
        Success = 1 => "success",
        Failed = 2 => "failed",
        RolledBack = 3 => "rolled_back",
    }
}
