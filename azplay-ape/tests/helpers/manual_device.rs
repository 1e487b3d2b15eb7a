//! Output device driven by the test instead of an audio host
//!
//! `open_stream` keeps the render callback; each `tick` invokes it once with
//! a buffer of the negotiated size, the way a host would at each period.

use azplay_ape::audio::output::{DeviceFault, FaultFn, OutputDevice, OutputStream, RenderFn};
use azplay_ape::audio::types::{CallbackTiming, DeviceSpec};
use azplay_ape::Result;
use azplay_common::events::DeviceInfo;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Shared {
    channels: u16,
    render: Mutex<Option<RenderFn>>,
    fault: Mutex<Option<FaultFn>>,
    spec: Mutex<Option<DeviceSpec>>,
    opened: Mutex<usize>,
}

#[derive(Clone)]
pub struct ManualDevice {
    shared: Arc<Shared>,
}

impl ManualDevice {
    pub fn new(channels: u16) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels,
                render: Mutex::new(None),
                fault: Mutex::new(None),
                spec: Mutex::new(None),
                opened: Mutex::new(0),
            }),
        }
    }

    /// Invoke the callback with the negotiated block size.
    ///
    /// Returns the rendered buffer, or `None` once the stream is closed.
    pub fn tick(&self) -> Option<Vec<f32>> {
        let frames = self.shared.spec.lock().unwrap().map(|s| s.block_frames)?;
        self.tick_frames(frames)
    }

    /// Invoke the callback with an arbitrary frame count
    pub fn tick_frames(&self, frames: usize) -> Option<Vec<f32>> {
        let mut guard = self.shared.render.lock().unwrap();
        let render = guard.as_mut()?;
        let mut out = vec![f32::NAN; frames * self.shared.channels as usize];
        render(
            &mut out,
            self.shared.channels,
            CallbackTiming {
                output_latency: Some(Duration::from_millis(5)),
            },
        );
        Some(out)
    }

    /// Report an asynchronous host error
    pub fn fault(&self, shutdown: bool) {
        if let Some(on_fault) = self.shared.fault.lock().unwrap().as_mut() {
            on_fault(DeviceFault {
                shutdown,
                message: "device unplugged".to_string(),
            });
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.render.lock().unwrap().is_some()
    }

    pub fn streams_opened(&self) -> usize {
        *self.shared.opened.lock().unwrap()
    }
}

impl OutputDevice for ManualDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            index: Some(1),
            name: Some("manual".to_string()),
        }
    }

    fn open_stream(
        &self,
        sample_rate: u32,
        block_frames: usize,
        render: RenderFn,
        on_fault: FaultFn,
    ) -> Result<Box<dyn OutputStream>> {
        let spec = DeviceSpec {
            block_frames,
            sample_rate,
            channels: self.shared.channels,
        };
        *self.shared.render.lock().unwrap() = Some(render);
        *self.shared.fault.lock().unwrap() = Some(on_fault);
        *self.shared.spec.lock().unwrap() = Some(spec);
        *self.shared.opened.lock().unwrap() += 1;
        Ok(Box::new(ManualStream {
            shared: Arc::clone(&self.shared),
            spec,
        }))
    }
}

struct ManualStream {
    shared: Arc<Shared>,
    spec: DeviceSpec,
}

impl OutputStream for ManualStream {
    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn play(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        *self.shared.render.lock().unwrap() = None;
        *self.shared.fault.lock().unwrap() = None;
    }
}
