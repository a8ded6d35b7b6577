//! FTMS (Fitness Machine Service) support for treadmills.
//!
//! Encodes the control point commands the controller needs (target speed and
//! target inclination), decodes control point responses and parses the
//! standard Heart Rate Measurement characteristic that feeds the controller.
//! The BLE link itself sits behind [`ControlPointWriter`].

use crate::treadmill::commands::{TreadmillCommands, TreadmillError};

/// Op code prefixing every control point response.
const RESPONSE_CODE: u8 = 0x80;

/// FTMS Control Point opcodes used by a treadmill session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FtmsControlOpcode {
    /// Request control of the fitness machine
    RequestControl = 0x00,
    /// Set target speed
    SetTargetSpeed = 0x02,
    /// Set target inclination
    SetTargetInclination = 0x03,
    /// Start or resume training
    StartOrResume = 0x07,
}

/// Result code carried in a control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointResult {
    Success,
    OpCodeNotSupported,
    InvalidParameter,
    OperationFailed,
    ControlNotPermitted,
    Unknown(u8),
}

impl From<u8> for ControlPointResult {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ControlPointResult::Success,
            0x02 => ControlPointResult::OpCodeNotSupported,
            0x03 => ControlPointResult::InvalidParameter,
            0x04 => ControlPointResult::OperationFailed,
            0x05 => ControlPointResult::ControlNotPermitted,
            other => ControlPointResult::Unknown(other),
        }
    }
}

impl std::fmt::Display for ControlPointResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlPointResult::Success => write!(f, "Success"),
            ControlPointResult::OpCodeNotSupported => write!(f, "Op code not supported"),
            ControlPointResult::InvalidParameter => write!(f, "Invalid parameter"),
            ControlPointResult::OperationFailed => write!(f, "Operation failed"),
            ControlPointResult::ControlNotPermitted => write!(f, "Control not permitted"),
            ControlPointResult::Unknown(code) => write!(f, "Unknown result 0x{:02X}", code),
        }
    }
}

/// A decoded control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPointResponse {
    /// Op code the treadmill is answering
    pub request_op_code: u8,
    /// Outcome of the request
    pub result: ControlPointResult,
}

impl ControlPointResponse {
    pub fn is_success(&self) -> bool {
        self.result == ControlPointResult::Success
    }
}

/// Build a control point command to request control.
pub fn build_request_control() -> Vec<u8> {
    vec![FtmsControlOpcode::RequestControl as u8]
}

/// Build a control point command to start or resume the belt.
pub fn build_start_training() -> Vec<u8> {
    vec![FtmsControlOpcode::StartOrResume as u8]
}

/// Build a control point command to set the target belt speed.
///
/// Speed is encoded as an unsigned 16-bit value in 0.01 km/h units.
pub fn build_set_target_speed(speed_kmh: f64) -> Vec<u8> {
    let raw = (speed_kmh * 100.0).round().clamp(0.0, u16::MAX as f64) as u16;
    let mut cmd = vec![FtmsControlOpcode::SetTargetSpeed as u8];
    cmd.extend_from_slice(&raw.to_le_bytes());
    cmd
}

/// Build a control point command to set the target inclination.
///
/// Inclination is encoded as a signed 16-bit value in 0.1 % units,
/// limited to the -100 % .. +100 % range FTMS allows.
pub fn build_set_target_inclination(incline_percent: f64) -> Vec<u8> {
    let raw = (incline_percent * 10.0).round().clamp(-1000.0, 1000.0) as i16;
    let mut cmd = vec![FtmsControlOpcode::SetTargetInclination as u8];
    cmd.extend_from_slice(&raw.to_le_bytes());
    cmd
}

/// Parse a control point response (`0x80, request_op_code, result_code`).
pub fn parse_control_point_response(data: &[u8]) -> Option<ControlPointResponse> {
    match data {
        [RESPONSE_CODE, op, result, ..] => Some(ControlPointResponse {
            request_op_code: *op,
            result: ControlPointResult::from(*result),
        }),
        _ => None,
    }
}

/// A decoded Heart Rate Measurement notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartRateMeasurement {
    /// Heart rate in BPM
    pub heart_rate_bpm: u16,
    /// `Some(contact)` when the strap reports skin contact
    pub sensor_contact: Option<bool>,
    /// Energy expended in kJ (if present)
    pub energy_expended_kj: Option<u16>,
    /// RR intervals in 1/1024 s units
    pub rr_intervals: Vec<u16>,
}

/// Parse a Heart Rate Measurement (0x2A37) notification.
pub fn parse_heart_rate_measurement(data: &[u8]) -> Option<HeartRateMeasurement> {
    let (&flags, rest) = data.split_first()?;

    let (heart_rate_bpm, mut rest) = if flags & 0x01 != 0 {
        match rest {
            [lo, hi, tail @ ..] => (u16::from_le_bytes([*lo, *hi]), tail),
            _ => return None,
        }
    } else {
        let (&bpm, tail) = rest.split_first()?;
        (bpm as u16, tail)
    };

    let sensor_contact = (flags & 0x04 != 0).then_some(flags & 0x02 != 0);

    let mut energy_expended_kj = None;
    if flags & 0x08 != 0 {
        if let [lo, hi, tail @ ..] = rest {
            energy_expended_kj = Some(u16::from_le_bytes([*lo, *hi]));
            rest = tail;
        }
    }

    let rr_intervals = if flags & 0x10 != 0 {
        rest.chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        Vec::new()
    };

    Some(HeartRateMeasurement {
        heart_rate_bpm,
        sensor_contact,
        energy_expended_kj,
        rr_intervals,
    })
}

/// Write access to a treadmill's FTMS control point.
///
/// Implementations write the command bytes and resolve with the indication the
/// treadmill sends back.
pub trait ControlPointWriter: Send + Sync {
    fn write_control_point(
        &self,
        command: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, TreadmillError>> + Send;
}

/// [`TreadmillCommands`] over an FTMS control point.
pub struct FtmsTreadmill<W: ControlPointWriter> {
    writer: W,
}

impl<W: ControlPointWriter> FtmsTreadmill<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Ask the treadmill for control. Must succeed before targets are accepted.
    pub async fn request_control(&self) -> Result<(), TreadmillError> {
        self.send(build_request_control()).await
    }

    /// Start or resume the belt.
    pub async fn start_training(&self) -> Result<(), TreadmillError> {
        self.send(build_start_training()).await
    }

    async fn send(&self, command: Vec<u8>) -> Result<(), TreadmillError> {
        let op_code = command.first().copied().unwrap_or_default();
        let response = self.writer.write_control_point(command).await?;

        let parsed = parse_control_point_response(&response).ok_or_else(|| {
            TreadmillError::CommandRejected(format!("Malformed response: {:02X?}", response))
        })?;

        if parsed.request_op_code != op_code {
            return Err(TreadmillError::CommandRejected(format!(
                "Response for op code 0x{:02X}, expected 0x{:02X}",
                parsed.request_op_code, op_code
            )));
        }

        if !parsed.is_success() {
            tracing::warn!("Treadmill refused op code 0x{:02X}: {}", op_code, parsed.result);
            return Err(TreadmillError::CommandRejected(parsed.result.to_string()));
        }

        Ok(())
    }
}

impl<W: ControlPointWriter> TreadmillCommands for FtmsTreadmill<W> {
    async fn set_speed(&self, speed_kmh: f64) -> Result<(), TreadmillError> {
        self.send(build_set_target_speed(speed_kmh)).await
    }

    async fn set_inclination(&self, incline_percent: f64) -> Result<(), TreadmillError> {
        self.send(build_set_target_inclination(incline_percent)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every write with a fixed result code and remembers what was written.
    struct ScriptedWriter {
        result_code: u8,
        written: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedWriter {
        fn answering(result_code: u8) -> Self {
            Self {
                result_code,
                written: Mutex::new(Vec::new()),
            }
        }
    }

    impl ControlPointWriter for ScriptedWriter {
        async fn write_control_point(&self, command: Vec<u8>) -> Result<Vec<u8>, TreadmillError> {
            let op = command[0];
            self.written.lock().unwrap().push(command);
            Ok(vec![RESPONSE_CODE, op, self.result_code])
        }
    }

    #[test]
    fn test_build_set_target_speed() {
        // 5.5 km/h = 550 = 0x0226
        assert_eq!(build_set_target_speed(5.5), vec![0x02, 0x26, 0x02]);
    }

    #[test]
    fn test_build_set_target_inclination_negative() {
        // -2.5 % = -25 = 0xFFE7
        assert_eq!(build_set_target_inclination(-2.5), vec![0x03, 0xE7, 0xFF]);
    }

    #[test]
    fn test_build_set_target_inclination_saturates() {
        let cmd = build_set_target_inclination(250.0);
        assert_eq!(i16::from_le_bytes([cmd[1], cmd[2]]), 1000);
    }

    #[test]
    fn test_parse_control_point_response() {
        let response = parse_control_point_response(&[0x80, 0x02, 0x05]).unwrap();
        assert_eq!(response.request_op_code, 0x02);
        assert_eq!(response.result, ControlPointResult::ControlNotPermitted);
        assert!(!response.is_success());

        assert!(parse_control_point_response(&[0x02, 0x01]).is_none());
    }

    #[test]
    fn test_parse_heart_rate_measurement_u8() {
        let hr = parse_heart_rate_measurement(&[0x00, 0x91]).unwrap();
        assert_eq!(hr.heart_rate_bpm, 145);
        assert_eq!(hr.sensor_contact, None);
        assert!(hr.rr_intervals.is_empty());
    }

    #[test]
    fn test_parse_heart_rate_measurement_u16_with_contact_and_rr() {
        // 16-bit HR, contact supported + detected, RR present
        let data = [0x17, 0x96, 0x00, 0x00, 0x04, 0x10, 0x04];
        let hr = parse_heart_rate_measurement(&data).unwrap();
        assert_eq!(hr.heart_rate_bpm, 150);
        assert_eq!(hr.sensor_contact, Some(true));
        assert_eq!(hr.rr_intervals, vec![1024, 1040]);
    }

    #[test]
    fn test_parse_heart_rate_measurement_truncated() {
        assert!(parse_heart_rate_measurement(&[]).is_none());
        assert!(parse_heart_rate_measurement(&[0x01, 0x96]).is_none());
    }

    #[tokio::test]
    async fn test_ftms_treadmill_set_speed_success() {
        let treadmill = FtmsTreadmill::new(ScriptedWriter::answering(0x01));
        treadmill.set_speed(8.0).await.unwrap();

        let written = treadmill.writer.written.lock().unwrap();
        assert_eq!(written.as_slice(), &[vec![0x02, 0x20, 0x03]]);
    }

    #[tokio::test]
    async fn test_ftms_treadmill_session_setup() {
        let treadmill = FtmsTreadmill::new(ScriptedWriter::answering(0x01));
        treadmill.request_control().await.unwrap();
        treadmill.start_training().await.unwrap();

        let written = treadmill.writer.written.lock().unwrap();
        assert_eq!(written.as_slice(), &[vec![0x00], vec![0x07]]);
    }

    #[tokio::test]
    async fn test_ftms_treadmill_control_not_permitted() {
        let treadmill = FtmsTreadmill::new(ScriptedWriter::answering(0x05));
        assert_eq!(
            treadmill.request_control().await,
            Err(TreadmillError::CommandRejected(
                "Control not permitted".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_ftms_treadmill_refused_inclination() {
        let treadmill = FtmsTreadmill::new(ScriptedWriter::answering(0x03));
        let result = treadmill.set_inclination(4.0).await;
        assert_eq!(
            result,
            Err(TreadmillError::CommandRejected("Invalid parameter".to_string()))
        );
    }
}
