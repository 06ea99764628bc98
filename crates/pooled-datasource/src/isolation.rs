//! Transaction isolation levels.

/// Transaction isolation level, carrying integer codes compatible with
/// the standard JDBC levels so that drivers which already speak those
/// codes (most SQL engines do) need no translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum IsolationLevel {
    /// No isolation guarantees.
    None = 0,
    /// Dirty reads, non-repeatable reads and phantom reads can occur.
    ReadUncommitted = 1,
    /// Dirty reads are prevented; non-repeatable reads and phantom reads can occur.
    ReadCommitted = 2,
    /// Dirty reads and non-repeatable reads are prevented; phantom reads can occur.
    RepeatableRead = 4,
    /// Dirty reads, non-repeatable reads and phantom reads are all prevented.
    Serializable = 8,
    /// SQL Server's snapshot isolation extension.
    SqlServerSnapshot = 0x1000,
}

impl IsolationLevel {
    /// The raw integer code for this level.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Look up a level by its raw integer code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::ReadUncommitted),
            2 => Some(Self::ReadCommitted),
            4 => Some(Self::RepeatableRead),
            8 => Some(Self::Serializable),
            0x1000 => Some(Self::SqlServerSnapshot),
            _ => None,
        }
    }
}
