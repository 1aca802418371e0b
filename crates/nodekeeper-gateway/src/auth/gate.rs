//! Which strategy runs for which guard, given the registration state.

use super::{IdentityContext, IdentityRecord, RegistrationState, Strategy};

/// The guard a route is protected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Password required.
    Basic,
    /// Session token required.
    Bearer,
    /// Session token required once registered; open before that.
    ConditionalBearer,
    /// Open only while unregistered; yields a record candidate.
    Registration,
}

impl GuardKind {
    const ALL: [Self; 4] = [
        Self::Basic,
        Self::Bearer,
        Self::ConditionalBearer,
        Self::Registration,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Basic => 0,
            Self::Bearer => 1,
            Self::ConditionalBearer => 2,
            Self::Registration => 3,
        }
    }
}

/// What a guard does in a given registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Run the strategy.
    Run(Strategy),
    /// Let the request through with no identity.
    PassThrough,
    /// Refuse because the device is already claimed.
    RejectRegistered,
}

/// Outcome of a guard that let the request through.
#[derive(Debug)]
pub enum Grant {
    /// Authenticated.
    Identity(IdentityContext),
    /// Conditional guard on an unclaimed device.
    Unregistered,
    /// Registration candidate.
    Candidate(IdentityRecord),
}

#[derive(Debug, Clone, Copy)]
struct Policy {
    unregistered: Dispatch,
    registered: Dispatch,
}

/// Guard dispatch table, built once at start.
#[derive(Debug, Clone)]
pub struct GuardTable {
    policies: [Policy; 4],
}

impl Default for GuardTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl GuardTable {
    /// The table every route uses.
    #[must_use]
    pub fn standard() -> Self {
        let policies = GuardKind::ALL.map(|kind| match kind {
            GuardKind::Basic => Policy {
                unregistered: Dispatch::Run(Strategy::Basic),
                registered: Dispatch::Run(Strategy::Basic),
            },
            GuardKind::Bearer => Policy {
                unregistered: Dispatch::Run(Strategy::Bearer),
                registered: Dispatch::Run(Strategy::Bearer),
            },
            GuardKind::ConditionalBearer => Policy {
                unregistered: Dispatch::PassThrough,
                registered: Dispatch::Run(Strategy::Bearer),
            },
            GuardKind::Registration => Policy {
                unregistered: Dispatch::Run(Strategy::Registration),
                registered: Dispatch::RejectRegistered,
            },
        });

        Self { policies }
    }

    /// Look up the dispatch for a guard.
    #[must_use]
    pub const fn dispatch(&self, kind: GuardKind, state: RegistrationState) -> Dispatch {
        let policy = self.policies[kind.index()];
        match state {
            RegistrationState::Unregistered => policy.unregistered,
            RegistrationState::Registered => policy.registered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_table() {
        use RegistrationState::{Registered, Unregistered};
        let table = GuardTable::standard();

        assert_eq!(
            table.dispatch(GuardKind::Basic, Unregistered),
            Dispatch::Run(Strategy::Basic)
        );
        assert_eq!(
            table.dispatch(GuardKind::Bearer, Unregistered),
            Dispatch::Run(Strategy::Bearer)
        );
        assert_eq!(
            table.dispatch(GuardKind::ConditionalBearer, Unregistered),
            Dispatch::PassThrough
        );
        assert_eq!(
            table.dispatch(GuardKind::ConditionalBearer, Registered),
            Dispatch::Run(Strategy::Bearer)
        );
        assert_eq!(
            table.dispatch(GuardKind::Registration, Unregistered),
            Dispatch::Run(Strategy::Registration)
        );
        assert_eq!(
            table.dispatch(GuardKind::Registration, Registered),
            Dispatch::RejectRegistered
        );
    }

    #[test]
    fn test_no_guard_passes_through_when_registered() {
        let table = GuardTable::standard();
        for kind in GuardKind::ALL {
            assert_ne!(
                table.dispatch(kind, RegistrationState::Registered),
                Dispatch::PassThrough
            );
        }
    }
}
