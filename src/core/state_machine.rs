//! Mode state machine
//!
//! Pure legality rules for control operations. The manager consults this
//! before touching the backend, so a rejected call never has side effects.

use crate::core::{
    error::{WifiError, WifiResult},
    types::Mode,
};

/// Control operations subject to mode checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Deinit,
    Scan,
    Connect,
    Disconnect,
    StartSoftAp,
    StopSoftAp,
    StartStation,
    GetInfo,
    RegisterCallbacks,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Deinit => "deinit",
            Operation::Scan => "scan",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::StartSoftAp => "start_soft_ap",
            Operation::StopSoftAp => "stop_soft_ap",
            Operation::StartStation => "start_station",
            Operation::GetInfo => "get_info",
            Operation::RegisterCallbacks => "register_callbacks",
        }
    }

    /// Modes in which the operation may run, once initialized
    fn permitted_in(self, mode: Mode) -> bool {
        match self {
            Operation::Init => mode == Mode::Uninitialized,
            Operation::Deinit | Operation::GetInfo | Operation::RegisterCallbacks => true,
            Operation::Scan => mode.is_station(),
            Operation::Connect | Operation::StartSoftAp => mode == Mode::Disconnected,
            Operation::Disconnect => mode == Mode::Connected,
            Operation::StopSoftAp => mode == Mode::SoftAp,
            Operation::StartStation => matches!(mode, Mode::Disconnected | Mode::SoftAp),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModeStateMachine {
    mode: Mode,
}

impl ModeStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Check that `operation` is legal in the current mode
    pub fn ensure(&self, operation: Operation) -> WifiResult<()> {
        match (self.mode, operation) {
            (Mode::Uninitialized, Operation::Init | Operation::Deinit) => Ok(()),
            (Mode::Uninitialized, _) => Err(WifiError::NotInitialized),
            (_, Operation::Init) => Err(WifiError::AlreadyInitialized),
            (mode, op) if op.permitted_in(mode) => Ok(()),
            (mode, op) => Err(WifiError::InvalidState {
                operation: op.name(),
                mode,
            }),
        }
    }

    /// Move to `to`, returning the previous mode
    ///
    /// Only the edges of the mode graph are accepted; anything else is a
    /// programming error in the caller and leaves the mode untouched.
    pub fn transition(&mut self, to: Mode) -> WifiResult<Mode> {
        let from = self.mode;
        let legal = matches!(
            (from, to),
            (Mode::Uninitialized, Mode::Disconnected)
                | (Mode::Disconnected, Mode::Connected)
                | (Mode::Disconnected, Mode::SoftAp)
                | (Mode::Connected, Mode::Disconnected)
                | (Mode::SoftAp, Mode::Disconnected)
                | (_, Mode::Uninitialized)
        );
        if !legal {
            return Err(WifiError::InvalidState {
                operation: "transition",
                mode: from,
            });
        }
        self.mode = to;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine_in(mode: Mode) -> ModeStateMachine {
        let mut sm = ModeStateMachine::new();
        match mode {
            Mode::Uninitialized => {}
            Mode::Disconnected => {
                sm.transition(Mode::Disconnected).unwrap();
            }
            Mode::Connected | Mode::SoftAp => {
                sm.transition(Mode::Disconnected).unwrap();
                sm.transition(mode).unwrap();
            }
        }
        sm
    }

    #[test]
    fn test_initial_mode() {
        assert_eq!(ModeStateMachine::new().mode(), Mode::Uninitialized);
    }

    #[test]
    fn test_uninitialized_rejects_everything_but_init_and_deinit() {
        let sm = machine_in(Mode::Uninitialized);
        assert!(sm.ensure(Operation::Init).is_ok());
        assert!(sm.ensure(Operation::Deinit).is_ok());
        for op in [
            Operation::Scan,
            Operation::Connect,
            Operation::Disconnect,
            Operation::StartSoftAp,
            Operation::StopSoftAp,
            Operation::StartStation,
            Operation::GetInfo,
            Operation::RegisterCallbacks,
        ] {
            assert_eq!(sm.ensure(op), Err(WifiError::NotInitialized));
        }
    }

    #[test]
    fn test_init_twice_is_rejected() {
        for mode in [Mode::Disconnected, Mode::Connected, Mode::SoftAp] {
            assert_eq!(
                machine_in(mode).ensure(Operation::Init),
                Err(WifiError::AlreadyInitialized)
            );
        }
    }

    #[test]
    fn test_scan_only_in_station_role() {
        assert!(machine_in(Mode::Disconnected).ensure(Operation::Scan).is_ok());
        assert!(machine_in(Mode::Connected).ensure(Operation::Scan).is_ok());
        assert_eq!(
            machine_in(Mode::SoftAp).ensure(Operation::Scan),
            Err(WifiError::InvalidState {
                operation: "scan",
                mode: Mode::SoftAp
            })
        );
    }

    #[test]
    fn test_connect_requires_disconnected() {
        assert!(machine_in(Mode::Disconnected).ensure(Operation::Connect).is_ok());
        assert!(matches!(
            machine_in(Mode::Connected).ensure(Operation::Connect),
            Err(WifiError::InvalidState { .. })
        ));
        assert!(matches!(
            machine_in(Mode::SoftAp).ensure(Operation::Connect),
            Err(WifiError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_stop_operations_require_matching_mode() {
        assert!(machine_in(Mode::Connected).ensure(Operation::Disconnect).is_ok());
        assert!(machine_in(Mode::Disconnected).ensure(Operation::Disconnect).is_err());
        assert!(machine_in(Mode::SoftAp).ensure(Operation::StopSoftAp).is_ok());
        assert!(machine_in(Mode::Connected).ensure(Operation::StopSoftAp).is_err());
        assert!(machine_in(Mode::SoftAp).ensure(Operation::StartStation).is_ok());
        assert!(machine_in(Mode::Connected).ensure(Operation::StartStation).is_err());
    }

    #[test]
    fn test_station_and_soft_ap_are_exclusive() {
        let mut sm = machine_in(Mode::Connected);
        assert!(sm.transition(Mode::SoftAp).is_err());
        assert_eq!(sm.mode(), Mode::Connected);

        let mut sm = machine_in(Mode::SoftAp);
        assert!(sm.transition(Mode::Connected).is_err());
        assert_eq!(sm.mode(), Mode::SoftAp);
    }

    #[test]
    fn test_deinit_reachable_from_any_mode() {
        for mode in [Mode::Disconnected, Mode::Connected, Mode::SoftAp] {
            let mut sm = machine_in(mode);
            assert_eq!(sm.transition(Mode::Uninitialized), Ok(mode));
            assert_eq!(sm.mode(), Mode::Uninitialized);
        }
    }
}
