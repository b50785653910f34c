/// Defaults for composition, alignment handling, playback and speech providers

pub mod alignment {
    /// Clamp shifts larger than this are logged as warnings (50ms)
    /// Smaller shifts are ordinary service timing noise
    pub const CLAMP_WARN_THRESHOLD_SECS: f64 = 0.05;
}

pub mod playback {
    /// Clock cadence requested from the output channel
    /// Also the window in which a repeated play/pause toggle is ignored
    pub const TICK_INTERVAL_MS: u64 = 50;

    /// Upper bound accepted for `tick_interval_ms` in settings
    pub const MAX_TICK_INTERVAL_MS: u64 = 1000;
}

pub mod speech {
    /// Speaking rate used to estimate timing for voices without alignment
    /// Roughly 165 words per minute of average English text
    pub const BROWSER_CHARS_PER_SECOND: f32 = 14.0;

    pub const DEFAULT_NEURAL_MODEL: &str = "eleven_multilingual_v2";
}
