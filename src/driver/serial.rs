//! ClearCore motion controller over a line-oriented serial link.
//!
//! Protocol: each command is written as its wire text followed by `\n`
//! (`on_h`, `off_h`, `em_stop`, `stat_h`) and the controller answers with
//! one status line. A line starting with `ERR` is a rejection. The
//! controller has no reset command; clearing an emergency stop takes a
//! power cycle.
//!
//! Replies carry no correlation id, so a reply only confirms a command when
//! it reports the state that command produces. A late answer to an earlier
//! command therefore cannot confirm a later one.
//!
//! Reply lines are read by a separate reader into a channel, so waiting for
//! a reply can time out without leaving a half-read line behind, and a
//! pending read never holds up a write.

use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::DeviceDriver;
use crate::domain::{Command, DeviceState};
use crate::error::DriverError;

/// Reply lines buffered between the reader and the driver.
const REPLY_BUFFER: usize = 16;

/// Driver for the ClearCore controller.
pub struct SerialDriver {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    replies: mpsc::Receiver<String>,
    /// `None` when replies come from a blocking reader thread, which exits
    /// on the first line after the driver is gone.
    reader: Option<JoinHandle<()>>,
    response_timeout: Duration,
    last_acknowledged: DeviceState,
}

impl SerialDriver {
    /// Opens the controller's tty device node.
    ///
    /// The node is opened once and the descriptor duplicated: one handle
    /// is read line by line on a dedicated thread, the other is written.
    /// The line discipline (baud rate, raw mode) is expected to be set up
    /// outside the gateway, e.g. with `stty` or a udev rule.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the device cannot be opened.
    pub async fn open(path: &Path, response_timeout: Duration) -> Result<Self, DriverError> {
        let owned = path.to_path_buf();
        let (read_side, write_side) = tokio::task::spawn_blocking(move || {
            let device = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&owned)?;
            let read_side = device.try_clone()?;
            Ok::<_, std::io::Error>((read_side, device))
        })
        .await
        .map_err(std::io::Error::other)??;

        let (tx, replies) = mpsc::channel(REPLY_BUFFER);
        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || read_replies_blocking(read_side, tx))?;
        tracing::info!(path = %path.display(), "opened serial device");

        Ok(Self {
            writer: Box::new(tokio::fs::File::from_std(write_side)),
            replies,
            reader: None,
            response_timeout,
            last_acknowledged: DeviceState::Off,
        })
    }

    /// Runs the protocol over any async byte stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_transport<T>(transport: T, response_timeout: Duration) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (tx, replies) = mpsc::channel(REPLY_BUFFER);
        let reader = tokio::spawn(read_replies(read_half, tx));
        Self {
            writer: Box::new(write_half),
            replies,
            reader: Some(reader),
            response_timeout,
            last_acknowledged: DeviceState::Off,
        }
    }

    /// Writes one command line and waits for the controller's reply.
    ///
    /// The write and the wait are each bounded by the response timeout.
    async fn exchange(&mut self, command: Command) -> Result<String, DriverError> {
        while let Ok(stale) = self.replies.try_recv() {
            tracing::debug!(%stale, "discarding unsolicited controller line");
        }

        let line = format!("{}\n", command.as_str());
        let write = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        };
        match tokio::time::timeout(self.response_timeout, write).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(%command, "controller write timed out");
                return Err(DriverError::NoResponse);
            }
        }

        match tokio::time::timeout(self.response_timeout, self.replies.recv()).await {
            Ok(Some(reply)) if reply.to_ascii_uppercase().starts_with("ERR") => {
                Err(DriverError::Rejected(reply))
            }
            Ok(Some(reply)) => {
                tracing::debug!(%command, %reply, "controller replied");
                Ok(reply)
            }
            Ok(None) => Err(DriverError::LinkClosed),
            Err(_) => Err(DriverError::NoResponse),
        }
    }

    /// Sends `command` and accepts only a reply that reports `expected`.
    async fn command(&mut self, command: Command, expected: DeviceState) -> Result<(), DriverError> {
        let reply = self.exchange(command).await?;
        if DeviceState::from_controller_reply(&reply) != Some(expected) {
            tracing::warn!(%command, %reply, "controller reply does not confirm command");
            return Err(DriverError::Unconfirmed {
                command: command.as_str(),
                reply,
            });
        }
        self.last_acknowledged = expected;
        Ok(())
    }
}

impl fmt::Debug for SerialDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialDriver")
            .field("response_timeout", &self.response_timeout)
            .field("last_acknowledged", &self.last_acknowledged)
            .finish_non_exhaustive()
    }
}

impl Drop for SerialDriver {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

#[async_trait]
impl DeviceDriver for SerialDriver {
    fn name(&self) -> &'static str {
        "serial"
    }

    async fn turn_on(&mut self) -> Result<(), DriverError> {
        self.command(Command::On, DeviceState::On).await
    }

    async fn turn_off(&mut self) -> Result<(), DriverError> {
        self.command(Command::Off, DeviceState::Off).await
    }

    async fn emergency_stop(&mut self) -> Result<(), DriverError> {
        self.command(Command::EmergencyStop, DeviceState::EmergencyStopped)
            .await
    }

    async fn read_status(&mut self) -> DeviceState {
        match self.exchange(Command::Status).await {
            Ok(reply) => match DeviceState::from_controller_reply(&reply) {
                Some(state) => {
                    self.last_acknowledged = state;
                    state
                }
                None => {
                    tracing::warn!(%reply, "unrecognized status reply");
                    self.last_acknowledged
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "status read failed; using last acknowledged state");
                self.last_acknowledged
            }
        }
    }

    /// Succeeds only when the controller itself answers `stat_h` with OFF.
    /// The last acknowledged state never stands in for that answer.
    async fn reset(&mut self) -> Result<(), DriverError> {
        let reply = self.exchange(Command::Status).await?;
        match DeviceState::from_controller_reply(&reply) {
            Some(DeviceState::Off) => {
                self.last_acknowledged = DeviceState::Off;
                Ok(())
            }
            Some(other) => Err(DriverError::ResetRefused(other)),
            None => Err(DriverError::Unconfirmed {
                command: Command::Status.as_str(),
                reply,
            }),
        }
    }
}

/// Forwards non-empty reply lines until the link or the driver goes away.
async fn read_replies<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::warn!("controller link closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "controller read failed");
                break;
            }
        }
    }
}
/// Blocking counterpart of [`read_replies`] for device nodes, run on its
/// own thread so a pending read never occupies the runtime.
fn read_replies_blocking(device: std::fs::File, tx: mpsc::Sender<String>) {
    for line in std::io::BufReader::new(device).lines() {
        match line {
            Ok(line) => {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.blocking_send(line).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "controller read failed");
                return;
            }
        }
    }
    tracing::warn!("controller link closed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    const TIMEOUT: Duration = Duration::from_millis(100);

    /// Fake controller: answers each received line with `reply(line)` and
    /// reports received lines on the returned channel.
    fn spawn_controller<F>(stream: DuplexStream, reply: F) -> mpsc::UnboundedReceiver<String>
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(stream);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let answer = reply(&line);
                let _ = seen_tx.send(line);
                if let Some(answer) = answer
                    && write_half
                        .write_all(format!("{answer}\n").as_bytes())
                        .await
                        .is_err()
                {
                    break;
                }
            }
        });
        seen_rx
    }

    fn driver_with<F>(reply: F) -> (SerialDriver, mpsc::UnboundedReceiver<String>)
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let (ours, theirs) = tokio::io::duplex(256);
        let seen = spawn_controller(theirs, reply);
        (SerialDriver::from_transport(ours, TIMEOUT), seen)
    }

    #[tokio::test]
    async fn writes_command_lines_and_accepts_replies() {
        let (mut driver, mut seen) = driver_with(|line| match line {
            "on_h" => Some("horse ON".to_string()),
            "off_h" => Some("horse OFF".to_string()),
            "em_stop" => Some("EM_STOP".to_string()),
            _ => None,
        });

        assert!(driver.turn_on().await.is_ok());
        assert!(driver.turn_off().await.is_ok());
        assert!(driver.emergency_stop().await.is_ok());

        assert_eq!(seen.recv().await.as_deref(), Some("on_h"));
        assert_eq!(seen.recv().await.as_deref(), Some("off_h"));
        assert_eq!(seen.recv().await.as_deref(), Some("em_stop"));
    }

    #[tokio::test]
    async fn silent_controller_times_out() {
        let (mut driver, _seen) = driver_with(|_| None);
        let result = driver.turn_on().await;
        assert!(matches!(result, Err(DriverError::NoResponse)));
    }

    #[tokio::test]
    async fn err_reply_is_a_rejection() {
        let (mut driver, _seen) = driver_with(|_| Some("ERR motor fault".to_string()));
        let Err(DriverError::Rejected(reply)) = driver.turn_on().await else {
            panic!("expected rejection");
        };
        assert_eq!(reply, "ERR motor fault");
    }

    #[tokio::test]
    async fn closed_link_is_reported() {
        let (ours, theirs) = tokio::io::duplex(256);
        drop(theirs);
        let mut driver = SerialDriver::from_transport(ours, TIMEOUT);
        let result = driver.emergency_stop().await;
        assert!(matches!(
            result,
            Err(DriverError::LinkClosed | DriverError::Io(_))
        ));
    }

    #[tokio::test]
    async fn read_status_parses_reply() {
        let (mut driver, _seen) = driver_with(|line| match line {
            "stat_h" => Some("horse ON".to_string()),
            _ => Some("ok".to_string()),
        });
        assert_eq!(driver.read_status().await, DeviceState::On);
    }

    #[tokio::test]
    async fn read_status_falls_back_to_last_acknowledged() {
        let (mut driver, _seen) = driver_with(|line| match line {
            "stat_h" => Some("???".to_string()),
            _ => Some("EM_STOP".to_string()),
        });
        assert!(driver.emergency_stop().await.is_ok());
        assert_eq!(driver.read_status().await, DeviceState::EmergencyStopped);
    }

    #[tokio::test]
    async fn reset_requires_power_cycled_controller() {
        let (mut stopped, _seen) = driver_with(|_| Some("EM_STOP".to_string()));
        assert!(matches!(
            stopped.reset().await,
            Err(DriverError::ResetRefused(DeviceState::EmergencyStopped))
        ));

        let (mut cycled, _seen) = driver_with(|_| Some("OFF".to_string()));
        assert!(cycled.reset().await.is_ok());
    }

    #[tokio::test]
    async fn unsolicited_lines_are_discarded_before_a_command() {
        let (ours, theirs) = tokio::io::duplex(256);
        let (read_half, mut write_half) = tokio::io::split(theirs);
        let mut driver = SerialDriver::from_transport(ours, TIMEOUT);

        let Ok(()) = write_half.write_all(b"ERR overheated\n").await else {
            panic!("write failed");
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                let _ = write_half.write_all(b"on\n").await;
            }
        });

        assert!(driver.turn_on().await.is_ok());
    }

    #[tokio::test]
    async fn reply_must_report_the_commanded_state() {
        let (mut driver, _seen) = driver_with(|_| Some("horse ON".to_string()));
        let Err(DriverError::Unconfirmed { command, reply }) = driver.emergency_stop().await else {
            panic!("an ON reply must not confirm an emergency stop");
        };
        assert_eq!(command, "em_stop");
        assert_eq!(reply, "horse ON");
    }

    #[tokio::test]
    async fn late_reply_does_not_confirm_the_next_command() {
        let (ours, theirs) = tokio::io::duplex(256);
        let mut driver = SerialDriver::from_transport(ours, TIMEOUT);

        // Answers the first command just after the driver gave up on it,
        // then goes silent.
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read_half).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                tokio::time::sleep(TIMEOUT + Duration::from_millis(20)).await;
                let _ = write_half.write_all(b"horse ON\n").await;
            }
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        assert!(matches!(driver.turn_on().await, Err(DriverError::NoResponse)));
        let result = driver.emergency_stop().await;
        assert!(matches!(
            result,
            Err(DriverError::Unconfirmed { .. } | DriverError::NoResponse)
        ));
    }

    #[tokio::test]
    async fn reset_with_silent_controller_is_refused() {
        let (mut driver, _seen) = driver_with(|_| None);
        assert!(matches!(
            driver.emergency_stop().await,
            Err(DriverError::NoResponse)
        ));
        assert_eq!(driver.last_acknowledged, DeviceState::Off);
        assert!(matches!(driver.reset().await, Err(DriverError::NoResponse)));
    }

    #[tokio::test]
    async fn reset_with_unparsable_status_is_refused() {
        let (mut driver, _seen) = driver_with(|_| Some("???".to_string()));
        assert!(matches!(
            driver.reset().await,
            Err(DriverError::Unconfirmed { command: "stat_h", .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn opened_device_node_answers_within_the_timeout() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("temp dir");
        };
        let path = dir.path().join("clearCore");
        let Ok(()) = nix::unistd::mkfifo(path.as_path(), nix::sys::stat::Mode::S_IRWXU) else {
            panic!("mkfifo failed");
        };
        let Ok(mut driver) = SerialDriver::open(&path, Duration::from_millis(200)).await else {
            panic!("open failed");
        };

        // A FIFO loops every written line back, so each command reads
        // its own text as the reply.
        let Ok(stopped) =
            tokio::time::timeout(Duration::from_secs(3), driver.emergency_stop()).await
        else {
            panic!("emergency_stop blocked past its response timeout");
        };
        assert!(stopped.is_ok());

        let Ok(turned_on) = tokio::time::timeout(Duration::from_secs(3), driver.turn_on()).await
        else {
            panic!("turn_on blocked past its response timeout");
        };
        assert!(matches!(turned_on, Err(DriverError::Unconfirmed { .. })));
    }
}
