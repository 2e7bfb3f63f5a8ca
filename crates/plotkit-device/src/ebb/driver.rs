//! EBB protocol driver
//!
//! Owns the request/reply exchange with the board. A spawned IO task is the
//! single writer of the transport: requests arrive over a channel, are
//! written in submission order, and complete through a per-request state
//! machine fed by the reader. The driver keeps at most one request
//! outstanding from the caller's point of view because every public method
//! awaits its reply before returning.
//!
//! Step counts handed to the board are integers; the fractional remainder
//! of every move is carried into the next one so long plans accumulate no
//! drift.

use crate::ebb::response::{classify, parse_qm, MotionStatus, ReplyLine};
use crate::ebb::version::FirmwareVersion;
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use plotkit_core::{Device, Error, ProtocolError, Result, TransportError, Vec2};
use plotkit_planner::{Block, PenMotion, XYMotion};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Rate units per step/s in the LM command, from the EBB's 25 kHz ISR and
/// 31-bit phase accumulator
const LM_RATE_SCALE: f64 = (1u64 << 31) as f64 / 25_000.0;

/// Sampling interval for the XM fallback path
const XM_TIMESTEP_MS: u64 = 15;

/// How often to poll QM while waiting for the board to drain
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Motor microstepping configuration (`EM` mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicrostepMode {
    /// 16 microsteps per full step (EM mode 1)
    #[default]
    Sixteenth,
    /// 8 microsteps per full step (EM mode 2)
    Eighth,
    /// 4 microsteps per full step (EM mode 3)
    Quarter,
    /// 2 microsteps per full step (EM mode 4)
    Half,
    /// Full steps (EM mode 5)
    Full,
}

impl MicrostepMode {
    /// The mode number passed to `EM`
    pub fn mode(self) -> u8 {
        match self {
            Self::Sixteenth => 1,
            Self::Eighth => 2,
            Self::Quarter => 3,
            Self::Half => 4,
            Self::Full => 5,
        }
    }

    /// Microsteps per planner step unit: `2^(5 - mode)`
    pub fn multiplier(self) -> u32 {
        1 << (5 - self.mode())
    }
}

/// Fractional-step carry between quantised moves
///
/// Continuous displacements are floored to integer steps; the remainder is
/// added to the next move so the residual per axis stays below one step for
/// the life of the plot.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepAccumulator {
    error_x: f64,
    error_y: f64,
}

impl StepAccumulator {
    /// Quantise a displacement, carrying the remainder
    pub fn take(&mut self, ideal_x: f64, ideal_y: f64) -> (i64, i64) {
        let fx = ideal_x + self.error_x;
        let fy = ideal_y + self.error_y;
        let sx = fx.floor();
        let sy = fy.floor();
        self.error_x = fx - sx;
        self.error_y = fy - sy;
        (sx as i64, sy as i64)
    }

    /// Current residual per axis
    pub fn error(&self) -> (f64, f64) {
        (self.error_x, self.error_y)
    }
}

/// Reply handling for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseMode {
    /// Resolve on the first payload line (queries: `V`, `QM`)
    AwaitOne,
    /// Collect lines until `OK` (mutations)
    AwaitUntilOk,
}

struct PendingRequest {
    command: String,
    mode: ResponseMode,
    collected: Vec<String>,
    done: oneshot::Sender<Result<Vec<String>>>,
}

/// Driver for one EiBotBoard
pub struct EbbDriver {
    cmd_tx: mpsc::UnboundedSender<PendingRequest>,
    device: Device,
    microstep: MicrostepMode,
    version: RwLock<Option<FirmwareVersion>>,
    accumulator: Mutex<StepAccumulator>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl EbbDriver {
    /// Start a driver over the given transport
    ///
    /// Spawns the IO task; must be called within a tokio runtime.
    pub fn new(transport: Box<dyn Transport>, device: Device) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(io_loop(transport, cmd_rx));
        Self {
            cmd_tx,
            device,
            microstep: MicrostepMode::default(),
            version: RwLock::new(None),
            accumulator: Mutex::new(StepAccumulator::default()),
            io_task: Mutex::new(Some(handle)),
        }
    }

    /// Use a non-default microstepping mode
    pub fn with_microstep_mode(mut self, mode: MicrostepMode) -> Self {
        self.microstep = mode;
        self
    }

    /// The device this driver was configured for
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Current fractional-step residual, for diagnostics
    pub fn substep_error(&self) -> (f64, f64) {
        self.accumulator.lock().error()
    }

    async fn request(&self, command: String, mode: ResponseMode) -> Result<Vec<String>> {
        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(PendingRequest {
                command,
                mode,
                collected: Vec::new(),
                done,
            })
            .map_err(|_| Error::from(TransportError::Disconnected))?;
        rx.await
            .map_err(|_| Error::from(TransportError::Disconnected))?
    }

    /// Issue a mutation command and wait for its `OK`
    async fn command(&self, command: String) -> Result<()> {
        self.request(command, ResponseMode::AwaitUntilOk)
            .await
            .map(|_| ())
    }

    /// Issue a query and return its single payload line
    async fn query(&self, command: &str) -> Result<String> {
        let lines = self
            .request(command.to_string(), ResponseMode::AwaitOne)
            .await?;
        lines.into_iter().next().ok_or_else(|| {
            ProtocolError::MalformedReply {
                command: command.to_string(),
                reply: String::new(),
            }
            .into()
        })
    }

    /// Firmware version, queried once and cached
    pub async fn firmware_version(&self) -> Result<FirmwareVersion> {
        if let Some(version) = *self.version.read() {
            return Ok(version);
        }
        let reply = self.query("V").await?;
        let version = FirmwareVersion::parse_reply(&reply)?;
        tracing::info!(%version, "EBB firmware identified");
        *self.version.write() = Some(version);
        Ok(version)
    }

    /// Enable both steppers at the configured microstepping mode
    pub async fn enable_motors(&self) -> Result<()> {
        let mode = self.microstep.mode();
        self.command(format!("EM,{},{}", mode, mode)).await
    }

    /// Power down the steppers immediately
    pub async fn disable_motors(&self) -> Result<()> {
        self.command("EM,0,0".to_string()).await
    }

    /// Release the drivetrain at the end of a plot
    ///
    /// On firmware with `SR`, arms the servo power-off timeout instead so
    /// the pen servo also stops holding torque a minute after the last
    /// motion; older firmware just gets its motors disabled.
    pub async fn release_motors(&self) -> Result<()> {
        if self.firmware_version().await?.supports_sr() {
            self.command("SR,60000000,0".to_string()).await
        } else {
            self.command("EM,0,0".to_string()).await
        }
    }

    /// Set the servo power-off timeout in microseconds
    ///
    /// Quietly skipped on firmware without `SR`; there is nothing to
    /// downgrade to and the servo simply stays powered.
    pub async fn set_servo_power_timeout(&self, timeout_us: u64, on: Option<bool>) -> Result<()> {
        if !self.firmware_version().await?.supports_sr() {
            tracing::debug!("Firmware lacks SR; leaving servo power management alone");
            return Ok(());
        }
        match on {
            Some(on) => {
                self.command(format!("SR,{},{}", timeout_us, on as u8))
                    .await
            }
            None => self.command(format!("SR,{}", timeout_us)).await,
        }
    }

    /// Move the pen servo to `pos` at `rate` servo counts per 24 ms,
    /// telling the board to hold `delay_ms` before the next motion command
    pub async fn set_pen_height(&self, pos: i32, rate: u32, delay_ms: u64) -> Result<()> {
        self.command(format!(
            "S2,{},{},{},{}",
            pos, self.device.servo_pin, rate, delay_ms
        ))
        .await
    }

    /// Execute a planned pen motion
    pub async fn pen_motion(&self, pen: &PenMotion) -> Result<()> {
        let duration_ms = (pen.duration * 1000.0).round() as u64;
        let delta = (pen.final_pos - pen.initial_pos).unsigned_abs();
        let rate = if duration_ms == 0 {
            0
        } else {
            (delta as f64 * 24.0 / duration_ms as f64).round() as u32
        };
        self.set_pen_height(pen.final_pos, rate, duration_ms).await
    }

    /// Home the carriage at the given step rate
    pub async fn home(&self, step_rate: u32) -> Result<()> {
        self.command(format!("HM,{}", step_rate)).await
    }

    /// Execute a planned XY motion
    ///
    /// Uses one `LM` per block on firmware that has it; otherwise falls
    /// back to constant-velocity `XM` slices sampled from the motion.
    pub async fn xy_motion(&self, motion: &XYMotion) -> Result<()> {
        if self.firmware_version().await?.supports_lm() {
            for block in motion.blocks() {
                self.lm_block(block).await?;
            }
            Ok(())
        } else {
            self.xm_motion(motion).await
        }
    }

    async fn lm_block(&self, block: &Block) -> Result<()> {
        let mult = self.microstep.multiplier() as f64;
        let delta = block.p2 - block.p1;
        let (sx, sy) = self.accumulator.lock().take(delta.x * mult, delta.y * mult);
        if sx == 0 && sy == 0 {
            return Ok(());
        }

        let dir = delta.normalized().unwrap_or(Vec2::ZERO);
        let v_initial = block.v_initial * mult;
        let v_final = block.v_final() * mult;
        let (rx_i, ry_i) = (v_initial * dir.x, v_initial * dir.y);
        let (rx_f, ry_f) = (v_final * dir.x, v_final * dir.y);

        // The board's motors drive the X+Y and X-Y axes of the carriage.
        let steps1 = sx + sy;
        let steps2 = sx - sy;
        let (rate1, delta1) = axis_rate(steps1, (rx_i + ry_i).abs(), (rx_f + ry_f).abs());
        let (rate2, delta2) = axis_rate(steps2, (rx_i - ry_i).abs(), (rx_f - ry_f).abs());

        self.command(format!(
            "LM,{},{},{},{},{},{}",
            rate1, steps1, delta1, rate2, steps2, delta2
        ))
        .await
    }

    async fn xm_motion(&self, motion: &XYMotion) -> Result<()> {
        let mult = self.microstep.multiplier() as f64;
        let duration = motion.duration();
        let timestep = XM_TIMESTEP_MS as f64 / 1000.0;

        let mut t = 0.0;
        let mut prev = motion.instant(0.0).p;
        while t < duration {
            let t_next = (t + timestep).min(duration);
            let slice_ms = ((t_next - t) * 1000.0).round() as u64;
            let p = motion.instant(t_next).p;
            let delta = p - prev;
            prev = p;
            t = t_next;

            let (sx, sy) = self.accumulator.lock().take(delta.x * mult, delta.y * mult);
            if sx == 0 && sy == 0 {
                continue;
            }
            self.command(format!("XM,{},{},{}", slice_ms, sx, sy)).await?;
        }
        Ok(())
    }

    /// Current motion status from `QM`
    pub async fn query_motion(&self) -> Result<MotionStatus> {
        let reply = self.query("QM").await?;
        Ok(parse_qm(&reply)?)
    }

    /// Poll `QM` until the command and FIFO status are both clear
    pub async fn wait_until_idle(&self) -> Result<()> {
        loop {
            if self.query_motion().await?.is_idle() {
                return Ok(());
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Stop the IO task; all outstanding requests fail with a transport
    /// error
    pub fn close(&self) {
        if let Some(handle) = self.io_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for EbbDriver {
    fn drop(&mut self) {
        self.close();
    }
}

/// LM axis parameters for one motor: `(initial_rate, rate_delta)`
fn axis_rate(steps: i64, initial_sps: f64, final_sps: f64) -> (i64, i64) {
    if steps == 0 {
        return (0, 0);
    }
    let initial = (initial_sps * LM_RATE_SCALE).round();
    let final_rate = (final_sps * LM_RATE_SCALE).round();
    let move_time = 2.0 * steps.unsigned_abs() as f64 / (initial_sps + final_sps);
    let delta = ((final_rate - initial) / (move_time * 25_000.0)).round();
    (initial as i64, delta as i64)
}

async fn io_loop(mut transport: Box<dyn Transport>, mut cmd_rx: mpsc::UnboundedReceiver<PendingRequest>) {
    let mut pending: VecDeque<PendingRequest> = VecDeque::new();
    let mut line_buf: Vec<u8> = Vec::new();
    let mut read_buf = [0u8; 256];
    let mut channel_open = true;

    'outer: loop {
        // Write phase: forward queued requests in submission order.
        while channel_open {
            match cmd_rx.try_recv() {
                Ok(request) => {
                    tracing::trace!(command = %request.command, "-> EBB");
                    if let Err(e) = transport.write_all(format!("{}\r", request.command).as_bytes())
                    {
                        tracing::error!("Serial write failed: {}", e);
                        pending.push_back(request);
                        fail_all(&mut pending, &e);
                        break 'outer;
                    }
                    pending.push_back(request);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    channel_open = false;
                }
            }
        }
        if !channel_open && pending.is_empty() {
            break;
        }

        // Read phase: split CR/LF lines and feed the front request.
        match transport.read_some(&mut read_buf) {
            Ok(0) => {}
            Ok(n) => {
                for &byte in &read_buf[..n] {
                    if byte == b'\r' || byte == b'\n' {
                        if !line_buf.is_empty() {
                            let line = String::from_utf8_lossy(&line_buf).to_string();
                            line_buf.clear();
                            feed_line(&mut pending, line.trim());
                        }
                    } else {
                        line_buf.push(byte);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Serial read failed: {}", e);
                fail_all(&mut pending, &e);
                break;
            }
        }

        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tracing::debug!("EBB IO loop stopped");
}

/// Advance the front request's state machine with one reply line
fn feed_line(pending: &mut VecDeque<PendingRequest>, line: &str) {
    tracing::trace!(line, "<- EBB");
    let Some(front) = pending.front_mut() else {
        tracing::warn!(line, "Unsolicited line from EBB");
        return;
    };

    match classify(line) {
        ReplyLine::Rejection(reply) => {
            let request = pending.pop_front().expect("front exists");
            let _ = request.done.send(Err(ProtocolError::Rejected {
                command: request.command,
                reply,
            }
            .into()));
        }
        ReplyLine::Ok => match front.mode {
            ResponseMode::AwaitUntilOk => {
                let request = pending.pop_front().expect("front exists");
                let _ = request.done.send(Ok(request.collected));
            }
            ResponseMode::AwaitOne => {
                let request = pending.pop_front().expect("front exists");
                let _ = request.done.send(Err(ProtocolError::MalformedReply {
                    command: request.command,
                    reply: line.to_string(),
                }
                .into()));
            }
        },
        ReplyLine::Payload(text) => match front.mode {
            ResponseMode::AwaitOne => {
                let request = pending.pop_front().expect("front exists");
                let _ = request.done.send(Ok(vec![text]));
            }
            ResponseMode::AwaitUntilOk => front.collected.push(text),
        },
    }
}

/// Fail every outstanding request after a transport failure
fn fail_all(pending: &mut VecDeque<PendingRequest>, error: &std::io::Error) {
    for request in pending.drain(..) {
        let _ = request.done.send(Err(TransportError::Io {
            reason: error.to_string(),
        }
        .into()));
    }
}
