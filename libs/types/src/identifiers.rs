//! Typed arena handles
//!
//! The engine stores ports, sockets and messages in owning vectors and hands
//! out plain indices wrapped in distinct newtypes. A handle is only
//! meaningful for the context that issued it.

use std::fmt;

/// Generates a zero-cost index wrapper with the usual conversions.
macro_rules! define_typed_index {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create a handle from a raw slot index
            #[inline(always)]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Slot index usable with the owning `Vec`
            #[inline(always)]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Handle for the element about to be pushed onto `len`-long storage
            #[inline]
            pub fn next_for(len: usize) -> Self {
                Self(len as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.index()
            }
        }
    };
}

define_typed_index!(
    /// Index of a port inside a context
    PortId, "port"
);

define_typed_index!(
    /// Index of a socket slot inside a socket pool
    SocketId, "socket"
);

/// Handle of a message: the owning port plus the slot inside that port.
///
/// Two handles comparing equal designate the same underlying message, even
/// when they were obtained under different local names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageHandle {
    pub port: PortId,
    pub slot: u32,
}

impl MessageHandle {
    pub const fn new(port: PortId, slot: u32) -> Self {
        Self { port, slot }
    }

    #[inline(always)]
    pub const fn slot_index(self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/msg#{}", self.port, self.slot)
    }
}
