/// Session-level screens and the behavior each one allows
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    /// A trial may be loaded, counted down and played on this screen.
    fn runs_trials(&self) -> bool;
    /// No further backend traffic or input handling happens once reached.
    fn is_terminal(&self) -> bool;
    /// Closing the window should be confirmed while this screen is shown.
    fn guards_navigation(&self) -> bool;

    fn is_familiarization(&self) -> bool {
        false
    }
    fn is_main(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Familiarization,
    Transition,
    Main,
    Finished,
    TimedOut,
    Paused,
}

impl Phase for SessionPhase {
    fn runs_trials(&self) -> bool {
        matches!(self, Self::Familiarization | Self::Main)
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::TimedOut | Self::Paused)
    }

    fn guards_navigation(&self) -> bool {
        matches!(self, Self::Familiarization | Self::Transition | Self::Main)
    }

    fn is_familiarization(&self) -> bool {
        matches!(self, SessionPhase::Familiarization)
    }

    fn is_main(&self) -> bool {
        matches!(self, SessionPhase::Main)
    }
}
