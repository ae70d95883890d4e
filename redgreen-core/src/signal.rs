/// The two hardware-alignment markers of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncSignal {
    /// Bound to the first logical frame advance.
    Start,
    /// Bound to the advance that completes the trial.
    End,
}

/// Color of the on-screen photodiode patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotodiodeState {
    #[default]
    Dark,
    Lit,
}

impl PhotodiodeState {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Lit,
            Self::Lit => Self::Dark,
        }
    }

    pub fn rgba(self) -> [u8; 4] {
        match self {
            Self::Dark => [0, 0, 0, 255],
            Self::Lit => [255, 255, 255, 255],
        }
    }
}
