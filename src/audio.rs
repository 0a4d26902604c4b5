// Audio playback capability.
//
// MIDI and WAV playback are delegated to a backend; the engine only hands
// over decoded asset bytes.  A real backend drives the MIDI clock by
// calling `Engine::notify_tick` from its own thread as playback advances.

/// Common interface for audio backends.
pub trait AudioBackend: Send {
    /// Start MIDI playback.  The backend owns the clock from here on.
    fn play_midi(&mut self, bytes: &[u8]) -> Result<(), String>;
    fn stop_midi(&mut self);

    /// Fire-and-forget WAV playback.
    fn play_wave(&mut self, bytes: &[u8]) -> Result<(), String>;

    /// Preload a sound resource; returns a backend-private handle.
    fn load_resource(&mut self, bytes: &[u8]) -> Result<i64, String>;
    fn play_resource(&mut self, handle: i64) -> Result<(), String>;
}

/// Backend that swallows all playback.  Used in headless mode; the MIDI
/// clock then only advances through explicit `notify_tick` calls.
#[derive(Default)]
pub struct NullAudio {
    next_handle: i64,
}

impl AudioBackend for NullAudio {
    fn play_midi(&mut self, _bytes: &[u8]) -> Result<(), String> {
        Ok(())
    }

    fn stop_midi(&mut self) {}

    fn play_wave(&mut self, _bytes: &[u8]) -> Result<(), String> {
        Ok(())
    }

    fn load_resource(&mut self, _bytes: &[u8]) -> Result<i64, String> {
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn play_resource(&mut self, _handle: i64) -> Result<(), String> {
        Ok(())
    }
}
