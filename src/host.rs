use std::io::{self, Read, Write};

use util::VmValue;

/// Services the interpreter requests from its embedding environment.
///
/// Character I/O is mandatory. The timed delay and LED refresh services
/// are optional; the default implementations report failure, which the
/// interpreter surfaces as an "undefined trap" fault, matching hosts that
/// simply do not wire those traps.
pub trait Host {
    /// Reads one character, blocking until one is available.
    /// Returns -1 at end of input.
    fn getchar(&mut self) -> VmValue;

    /// Writes one character.
    fn putchar(&mut self, ch: u8);

    /// Flushes buffered output.
    fn flush(&mut self);

    /// Sleeps for `ms` milliseconds.
    fn delay_ms(&mut self, _ms: VmValue) -> Result<(), ()> {
        Err(())
    }

    /// Refreshes the host LEDs from the current DATA memory.
    fn update_leds(&mut self, _data: &[u8]) -> Result<(), ()> {
        Err(())
    }
}

/// Standard-input/standard-output host used by the command line runner.
///
/// Like the reference console ports, it provides character I/O only; a
/// program that calls `delayMs` or `updateLeds` aborts with an undefined
/// trap fault.
pub struct Console {
    out: io::Stdout,
}

impl Console {
    pub fn new() -> Console {
        Console { out: io::stdout() }
    }
}

impl Default for Console {
    fn default() -> Console {
        Console::new()
    }
}

impl Host for Console {
    fn getchar(&mut self) -> VmValue {
        let mut buf = [0u8; 1];
        match io::stdin().read(&mut buf) {
            Ok(1) => VmValue::from(buf[0]),
            _ => -1,
        }
    }

    fn putchar(&mut self, ch: u8) {
        // stdout write failures are not recoverable from bytecode
        let _ = self.out.write_all(&[ch]);
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

/// In-memory host with scripted input, used by tests and embeddings that
/// want to observe a program's effects.
///
/// # Examples
/// ```
/// use bvm::host::{Capture, Host};
///
/// let mut host = Capture::new(b"x");
/// assert_eq!(host.getchar(), 120);
/// assert_eq!(host.getchar(), -1);
/// host.putchar(b'A');
/// assert_eq!(host.output(), b"A");
/// ```
pub struct Capture {
    input: Vec<u8>,
    position: usize,
    output: Vec<u8>,
    delays: Vec<VmValue>,
    led_updates: usize,
}

impl Capture {
    pub fn new(input: &[u8]) -> Capture {
        Capture {
            input: Vec::from(input),
            position: 0,
            output: Vec::new(),
            delays: Vec::new(),
            led_updates: 0,
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output[..]
    }

    pub fn output_str(&self) -> &str {
        std::str::from_utf8(&self.output[..]).expect("non-UTF-8 output")
    }

    /// Delays requested through [`Host::delay_ms`], in request order.
    pub fn delays(&self) -> &[VmValue] {
        &self.delays[..]
    }

    /// Number of [`Host::update_leds`] calls.
    pub fn led_updates(&self) -> usize {
        self.led_updates
    }
}

impl Host for Capture {
    fn getchar(&mut self) -> VmValue {
        if self.position < self.input.len() {
            let ch = self.input[self.position];
            self.position += 1;
            VmValue::from(ch)
        } else {
            -1
        }
    }

    fn putchar(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn flush(&mut self) {}

    fn delay_ms(&mut self, ms: VmValue) -> Result<(), ()> {
        self.delays.push(ms);
        Ok(())
    }

    fn update_leds(&mut self, _data: &[u8]) -> Result<(), ()> {
        self.led_updates += 1;
        Ok(())
    }
}
