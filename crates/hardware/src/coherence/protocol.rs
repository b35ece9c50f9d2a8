//! Protocol transition tables: one `cache_*`/`snoop_*` pair per protocol.
//!
//! `cache_*` governs a processor's own state when it issues a load or store
//! against a line it already holds (or doesn't); `snoop_*` governs a
//! processor's state when it observes someone else's bus request, and is
//! reused by [`cache_complete`] to resolve a requester's own transient state
//! once its request finishes. Both are pure functions of the current state
//! (or its absence, meaning INVALID), so the controller never special-cases
//! a missing entry.
//!
//! MI and MSI mirror a real snoop controller's two simplest points on the
//! spectrum. MESI, MOESI and MESIF extend MSI with EXCLUSIVE, OWNED and
//! FORWARD respectively, each adding exactly the bus traffic its extra
//! state is meant to save.

use super::states::LineState;
use super::CacheAction;
use crate::config::Protocol;
use crate::error::protocol_violation;

/// Bus message types exchanged over the interconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    /// Request to read a line not already held.
    BusRd,
    /// Request to write a line not already held exclusively.
    BusWr,
    /// A dirty line's data, forwarded cache-to-cache.
    Data,
    /// "I have a clean copy too" with no data attached.
    Shared,
    /// A clean copy's data, attached so the requester can skip a memory trip.
    SharedData,
    /// Acknowledgement that carries no data (e.g. a writeback drain).
    Ack,
}

/// Outcome of a cache issuing a load or store against its own line.
pub struct CacheOutcome {
    pub new_state: Option<LineState>,
    pub perm_avail: bool,
    pub request: Option<MsgKind>,
}

/// Outcome of a cache observing someone else's bus request.
pub struct SnoopOutcome {
    pub new_state: Option<LineState>,
    pub action: CacheAction,
    pub response: Option<MsgKind>,
}

impl SnoopOutcome {
    fn unchanged(state: Option<LineState>) -> Self {
        Self {
            new_state: state,
            action: CacheAction::NoAction,
            response: None,
        }
    }
}

// ---------------------------------------------------------------- MI ----

pub fn cache_mi(_is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match state {
        None => CacheOutcome {
            new_state: Some(LineState::InvalidModified),
            perm_avail: false,
            request: Some(MsgKind::BusWr),
        },
        Some(LineState::Modified) => CacheOutcome {
            new_state: Some(LineState::Modified),
            perm_avail: true,
            request: None,
        },
        Some(LineState::InvalidModified) => CacheOutcome {
            new_state: Some(LineState::InvalidModified),
            perm_avail: false,
            request: None,
        },
        Some(other) => protocol_violation(format!("MI: cache_req in unreachable state {other:?}")),
    }
}

pub fn snoop_mi(req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match state {
        None => SnoopOutcome::unchanged(None),
        Some(LineState::Modified) => SnoopOutcome {
            new_state: None,
            action: CacheAction::Invalidate,
            response: Some(MsgKind::Data),
        },
        Some(LineState::InvalidModified) => {
            if matches!(req, MsgKind::Data) {
                SnoopOutcome {
                    new_state: Some(LineState::Modified),
                    action: CacheAction::DataRecv,
                    response: None,
                }
            } else {
                SnoopOutcome::unchanged(Some(LineState::InvalidModified))
            }
        }
        Some(other) => protocol_violation(format!("MI: snoop in unreachable state {other:?}")),
    }
}

// --------------------------------------------------------------- MSI ----

pub fn cache_msi(is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match state {
        None => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::InvalidShared),
                    perm_avail: false,
                    request: Some(MsgKind::BusRd),
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::InvalidModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        Some(LineState::Share) => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::Share),
                    perm_avail: true,
                    request: None,
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::SharedModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        Some(LineState::Modified) => CacheOutcome {
            new_state: Some(LineState::Modified),
            perm_avail: true,
            request: None,
        },
        Some(LineState::SharedModified) => CacheOutcome {
            new_state: Some(LineState::SharedModified),
            perm_avail: is_load,
            request: None,
        },
        Some(LineState::InvalidShared) => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::InvalidShared),
                    perm_avail: false,
                    request: None,
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::InvalidModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        Some(LineState::InvalidModified) => CacheOutcome {
            new_state: Some(LineState::InvalidModified),
            perm_avail: false,
            request: None,
        },
        Some(other) => protocol_violation(format!("MSI: cache_req in unreachable state {other:?}")),
    }
}

pub fn snoop_msi(req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match state {
        None => SnoopOutcome::unchanged(None),
        Some(LineState::Modified) => match req {
            MsgKind::BusRd => SnoopOutcome {
                new_state: Some(LineState::Share),
                action: CacheAction::NoAction,
                response: Some(MsgKind::Data),
            },
            MsgKind::BusWr => SnoopOutcome {
                new_state: None,
                action: CacheAction::Invalidate,
                response: Some(MsgKind::Data),
            },
            _ => SnoopOutcome::unchanged(Some(LineState::Modified)),
        },
        Some(LineState::Share) => {
            if matches!(req, MsgKind::BusWr) {
                SnoopOutcome {
                    new_state: None,
                    action: CacheAction::Invalidate,
                    response: None,
                }
            } else {
                SnoopOutcome::unchanged(Some(LineState::Share))
            }
        }
        Some(LineState::SharedModified) => resolve_transient(req, LineState::Modified, Some(LineState::SharedModified)),
        Some(LineState::InvalidModified) => resolve_transient(req, LineState::Modified, Some(LineState::InvalidModified)),
        Some(LineState::InvalidShared) => resolve_transient(req, LineState::Share, Some(LineState::InvalidShared)),
        Some(other) => protocol_violation(format!("MSI: snoop in unreachable state {other:?}")),
    }
}

fn resolve_transient(req: MsgKind, settled: LineState, transient: Option<LineState>) -> SnoopOutcome {
    if matches!(req, MsgKind::Data | MsgKind::Shared | MsgKind::SharedData | MsgKind::Ack) {
        SnoopOutcome {
            new_state: Some(settled),
            action: CacheAction::DataRecv,
            response: None,
        }
    } else {
        SnoopOutcome::unchanged(transient)
    }
}

// -------------------------------------------------------------- MESI ----

pub fn cache_mesi(is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match state {
        None => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::InvalidSharedExclusive),
                    perm_avail: false,
                    request: Some(MsgKind::BusRd),
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::InvalidModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        Some(LineState::Exclusive) => CacheOutcome {
            new_state: Some(if is_load { LineState::Exclusive } else { LineState::Modified }),
            perm_avail: true,
            request: None,
        },
        Some(LineState::InvalidSharedExclusive) => CacheOutcome {
            new_state: Some(LineState::InvalidSharedExclusive),
            perm_avail: false,
            request: None,
        },
        Some(other) => cache_msi(is_load, Some(other)),
    }
}

pub fn snoop_mesi(req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match state {
        Some(LineState::Exclusive) => match req {
            MsgKind::BusRd => SnoopOutcome {
                new_state: Some(LineState::Share),
                action: CacheAction::NoAction,
                response: Some(MsgKind::Shared),
            },
            MsgKind::BusWr => SnoopOutcome {
                new_state: None,
                action: CacheAction::Invalidate,
                response: None,
            },
            _ => SnoopOutcome::unchanged(Some(LineState::Exclusive)),
        },
        Some(LineState::InvalidSharedExclusive) => {
            if matches!(req, MsgKind::Data) {
                SnoopOutcome {
                    new_state: Some(LineState::Exclusive),
                    action: CacheAction::DataRecv,
                    response: None,
                }
            } else if matches!(req, MsgKind::Shared | MsgKind::SharedData) {
                SnoopOutcome {
                    new_state: Some(LineState::Share),
                    action: CacheAction::DataRecv,
                    response: None,
                }
            } else {
                SnoopOutcome::unchanged(Some(LineState::InvalidSharedExclusive))
            }
        }
        other => snoop_msi(req, other),
    }
}

// ------------------------------------------------------------- MOESI ----

pub fn cache_moesi(is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match state {
        Some(LineState::Owned) => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::Owned),
                    perm_avail: true,
                    request: None,
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::SharedModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        other => cache_mesi(is_load, other),
    }
}

pub fn snoop_moesi(req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match state {
        // MODIFIED supplies data on a read snoop but keeps it dirty in OWNED
        // rather than writing back, so the next BUSRD is served the same way.
        Some(LineState::Modified) if matches!(req, MsgKind::BusRd) => SnoopOutcome {
            new_state: Some(LineState::Owned),
            action: CacheAction::NoAction,
            response: Some(MsgKind::Data),
        },
        Some(LineState::Owned) => match req {
            MsgKind::BusRd => SnoopOutcome {
                new_state: Some(LineState::Owned),
                action: CacheAction::NoAction,
                response: Some(MsgKind::Data),
            },
            MsgKind::BusWr => SnoopOutcome {
                new_state: None,
                action: CacheAction::Invalidate,
                response: Some(MsgKind::Data),
            },
            _ => SnoopOutcome::unchanged(Some(LineState::Owned)),
        },
        other => snoop_mesi(req, other),
    }
}

// ------------------------------------------------------------- MESIF ----

pub fn cache_mesif(is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match state {
        Some(LineState::Forward) => {
            if is_load {
                CacheOutcome {
                    new_state: Some(LineState::Forward),
                    perm_avail: true,
                    request: None,
                }
            } else {
                CacheOutcome {
                    new_state: Some(LineState::SharedModified),
                    perm_avail: false,
                    request: Some(MsgKind::BusWr),
                }
            }
        }
        other => cache_mesi(is_load, other),
    }
}

pub fn snoop_mesif(req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match state {
        // The designated forwarder hands data (and the forwarding duty) to
        // the new sharer, demoting itself to a plain SHARE copy.
        Some(LineState::Forward) => match req {
            MsgKind::BusRd => SnoopOutcome {
                new_state: Some(LineState::Share),
                action: CacheAction::NoAction,
                response: Some(MsgKind::SharedData),
            },
            MsgKind::BusWr => SnoopOutcome {
                new_state: None,
                action: CacheAction::Invalidate,
                response: Some(MsgKind::Data),
            },
            _ => SnoopOutcome::unchanged(Some(LineState::Forward)),
        },
        Some(LineState::Exclusive) if matches!(req, MsgKind::BusRd) => SnoopOutcome {
            new_state: Some(LineState::Forward),
            action: CacheAction::NoAction,
            response: Some(MsgKind::SharedData),
        },
        other => snoop_mesi(req, other),
    }
}

/// Dispatches to the transition table selected by `protocol`.
pub fn cache_outcome(protocol: Protocol, is_load: bool, state: Option<LineState>) -> CacheOutcome {
    match protocol {
        Protocol::Mi => cache_mi(is_load, state),
        Protocol::Msi => cache_msi(is_load, state),
        Protocol::Mesi => cache_mesi(is_load, state),
        Protocol::Moesi => cache_moesi(is_load, state),
        Protocol::Mesif => cache_mesif(is_load, state),
    }
}

/// Dispatches to the transition table selected by `protocol`.
pub fn snoop_outcome(protocol: Protocol, req: MsgKind, state: Option<LineState>) -> SnoopOutcome {
    match protocol {
        Protocol::Mi => snoop_mi(req, state),
        Protocol::Msi => snoop_msi(req, state),
        Protocol::Mesi => snoop_mesi(req, state),
        Protocol::Moesi => snoop_moesi(req, state),
        Protocol::Mesif => snoop_mesif(req, state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mi_read_and_write_both_demand_exclusive_ownership() {
        let load = cache_mi(true, None);
        assert_eq!(load.request, Some(MsgKind::BusWr));
        assert!(!load.perm_avail);
    }

    #[test]
    fn msi_store_on_shared_line_upgrades_without_reacquiring_data() {
        let outcome = cache_msi(false, Some(LineState::Share));
        assert_eq!(outcome.new_state, Some(LineState::SharedModified));
        assert_eq!(outcome.request, Some(MsgKind::BusWr));
    }

    #[test]
    fn mesi_store_on_exclusive_line_upgrades_locally_with_no_bus_traffic() {
        let outcome = cache_mesi(false, Some(LineState::Exclusive));
        assert_eq!(outcome.new_state, Some(LineState::Modified));
        assert!(outcome.perm_avail);
        assert!(outcome.request.is_none());
    }

    #[test]
    fn mesi_exclusive_demotes_to_share_on_busrd_snoop_without_data() {
        let outcome = snoop_mesi(MsgKind::BusRd, Some(LineState::Exclusive));
        assert_eq!(outcome.new_state, Some(LineState::Share));
        assert_eq!(outcome.response, Some(MsgKind::Shared));
    }

    #[test]
    fn moesi_modified_demotes_to_owned_on_read_snoop_instead_of_share() {
        let outcome = snoop_moesi(MsgKind::BusRd, Some(LineState::Modified));
        assert_eq!(outcome.new_state, Some(LineState::Owned));
        assert_eq!(outcome.response, Some(MsgKind::Data));
    }

    #[test]
    fn mesif_forward_hands_off_duty_to_new_sharer_on_read_snoop() {
        let outcome = snoop_mesif(MsgKind::BusRd, Some(LineState::Forward));
        assert_eq!(outcome.new_state, Some(LineState::Share));
        assert_eq!(outcome.response, Some(MsgKind::SharedData));
    }
}
