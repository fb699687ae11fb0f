// src/engine/plan.rs

//! Pure decision step of a serve cycle: build or not, and what to do with
//! the workload's state.

/// What was observed before the cycle started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleInputs {
    /// The workload home has been bootstrapped before.
    pub initialized: bool,
    /// `--force-reset`, or `--reset-once` not yet consumed.
    pub force_reset: bool,
    pub config_changed: bool,
    pub source_changed: bool,
    /// Also true when the binary is missing.
    pub binary_changed: bool,
    pub exported_state_exists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Remove the home and bootstrap from scratch.
    InitializeFresh,
    /// Wipe the data directory and re-import the last exported state.
    ResetAndImport,
    /// Start against the existing state untouched.
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    pub build: bool,
    pub state: StateAction,
}

/// Decide what a cycle has to do.
///
/// A forced reset or a config change makes the existing state unusable, so
/// those are treated exactly like a workload that was never initialized.
pub fn plan_cycle(inputs: CycleInputs) -> CyclePlan {
    let usable_state = inputs.initialized && !(inputs.force_reset || inputs.config_changed);
    let app_modified = inputs.source_changed || inputs.binary_changed;

    let state = if !usable_state || (app_modified && !inputs.exported_state_exists) {
        StateAction::InitializeFresh
    } else if app_modified {
        StateAction::ResetAndImport
    } else {
        StateAction::Resume
    };

    CyclePlan {
        build: !usable_state || app_modified,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn served_before() -> CycleInputs {
        CycleInputs {
            initialized: true,
            exported_state_exists: true,
            ..CycleInputs::default()
        }
    }

    #[test]
    fn fresh_workspace_builds_and_initializes() {
        let plan = plan_cycle(CycleInputs {
            config_changed: true,
            source_changed: true,
            binary_changed: true,
            ..CycleInputs::default()
        });
        assert_eq!(
            plan,
            CyclePlan {
                build: true,
                state: StateAction::InitializeFresh
            }
        );
    }

    #[test]
    fn nothing_changed_resumes_without_build() {
        let plan = plan_cycle(served_before());
        assert_eq!(
            plan,
            CyclePlan {
                build: false,
                state: StateAction::Resume
            }
        );
    }

    #[test]
    fn source_change_with_export_resets_and_imports() {
        let plan = plan_cycle(CycleInputs {
            source_changed: true,
            ..served_before()
        });
        assert_eq!(
            plan,
            CyclePlan {
                build: true,
                state: StateAction::ResetAndImport
            }
        );
    }

    #[test]
    fn source_change_without_export_reinitializes() {
        let plan = plan_cycle(CycleInputs {
            binary_changed: true,
            exported_state_exists: false,
            ..served_before()
        });
        assert_eq!(plan.state, StateAction::InitializeFresh);
        assert!(plan.build);
    }

    #[test]
    fn force_reset_and_config_change_reinitialize() {
        for inputs in [
            CycleInputs {
                force_reset: true,
                ..served_before()
            },
            CycleInputs {
                config_changed: true,
                ..served_before()
            },
        ] {
            let plan = plan_cycle(inputs);
            assert_eq!(plan.state, StateAction::InitializeFresh);
            assert!(plan.build);
        }
    }
}
