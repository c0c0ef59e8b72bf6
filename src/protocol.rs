//! Move hub wire protocol
//!
//! This module contains the protocol definitions for communicating with
//! the hub: the service/characteristic identifiers, the port and color
//! resolvers, and the frame encoder.
//!
//! Every command is a fixed-length frame written to the control
//! characteristic. The first two bytes of a frame are its total length,
//! little-endian, including those two bytes.

use crate::error::ProtocolError;
use std::str::FromStr;
use uuid::Uuid;

/// Primary service UUID advertised by the hub.
///
/// An advertisement belongs to the hub class iff this is its first
/// advertised service (see [`crate::scanner::is_hub_advertisement`]).
pub const HUB_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001623_1212_efde_1623_785feabcd123);

/// Control characteristic UUID - the single channel commands are written to
/// and notifications arrive on.
pub const CONTROL_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00001624_1212_efde_1623_785feabcd123);

// Frame body bytes shared by all output commands.
const MSG_PORT_OUTPUT: u8 = 0x81;
const EXECUTE_IMMEDIATELY: u8 = 0x11;
const SUBCMD_MOTOR_TIME: u8 = 0x09;
const SUBCMD_MOTOR_ANGLE: u8 = 0x0b;
const SUBCMD_SET_COLOR: u8 = 0x51;
/// Internal port the RGB LED is attached to.
const LED_PORT: u8 = 0x32;
const MAX_POWER: u8 = 0x64;
const END_STATE_BRAKE: u8 = 0x7f;
const PROFILE_ACCEL_DECEL: u8 = 0x03;

/// Motor ports of the hub.
///
/// `A`, `B` and the virtual pair `AB` are the built-in tacho motors; `C`
/// and `D` are the external connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    AB,
    C,
    D,
}

impl Port {
    /// Protocol port code. One-directional; codes are never decoded back.
    pub fn code(self) -> u8 {
        match self {
            Self::A => 0x37,
            Self::B => 0x38,
            Self::AB => 0x39,
            Self::C => 0x01,
            Self::D => 0x02,
        }
    }
}

impl FromStr for Port {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "AB" => Ok(Self::AB),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(ProtocolError::UnknownPort(s.to_string())),
        }
    }
}

/// Colors of the hub's RGB LED, in protocol index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off = 0,
    Pink = 1,
    Purple = 2,
    Blue = 3,
    LightBlue = 4,
    Cyan = 5,
    Green = 6,
    Yellow = 7,
    Orange = 8,
    Red = 9,
    White = 10,
}

impl LedColor {
    /// Protocol color index (0-10).
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl From<bool> for LedColor {
    /// `true` is white, `false` is off.
    fn from(on: bool) -> Self {
        if on {
            Self::White
        } else {
            Self::Off
        }
    }
}

impl FromStr for LedColor {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "pink" => Ok(Self::Pink),
            "purple" => Ok(Self::Purple),
            "blue" => Ok(Self::Blue),
            "lightblue" => Ok(Self::LightBlue),
            "cyan" => Ok(Self::Cyan),
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "orange" => Ok(Self::Orange),
            "red" => Ok(Self::Red),
            "white" => Ok(Self::White),
            _ => Err(ProtocolError::UnknownColor(s.to_string())),
        }
    }
}

/// A single command for the hub. Constructed, encoded and discarded per
/// call; carries no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run a motor for a duration.
    MotorTime {
        port: Port,
        duration_ms: u32,
        duty_cycle: i8,
    },
    /// Run a motor to a relative angle, in encoder units.
    MotorAngle {
        port: Port,
        angle: u32,
        duty_cycle: i8,
    },
    /// Set the hub LED color.
    Led { color: LedColor },
}

impl Command {
    /// Encode this command into its wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match *self {
            Self::MotorTime {
                port,
                duration_ms,
                duty_cycle,
            } => encode_motor_time(port, duration_ms, duty_cycle),
            Self::MotorAngle {
                port,
                angle,
                duty_cycle,
            } => encode_motor_angle(port, angle, duty_cycle),
            Self::Led { color } => Ok(encode_led(color)),
        }
    }
}

/// Encode a run-motor-for-duration command.
///
/// # Frame layout (12 bytes)
///
/// ```text
/// [0-1]  : frame length, little-endian (0x0c, 0x00)
/// [2]    : port output opcode (0x81)
/// [3]    : port code
/// [4]    : execute immediately (0x11)
/// [5]    : motor-time subcommand (0x09)
/// [6-7]  : duration, little-endian
/// [8]    : duty cycle byte
/// [9]    : max power (0x64)
/// [10]   : end state brake (0x7f)
/// [11]   : accel/decel profile (0x03)
/// ```
///
/// The duration field carries `duration_ms * 1000 mod 65536`: values beyond
/// 16 bits wrap silently.
pub fn encode_motor_time(
    port: Port,
    duration_ms: u32,
    duty_cycle: i8,
) -> Result<Vec<u8>, ProtocolError> {
    let duty = duty_cycle_byte(duty_cycle)?;
    let [lo, hi] = ((u64::from(duration_ms) * 1000) as u16).to_le_bytes();
    Ok(frame(&[
        MSG_PORT_OUTPUT,
        port.code(),
        EXECUTE_IMMEDIATELY,
        SUBCMD_MOTOR_TIME,
        lo,
        hi,
        duty,
        MAX_POWER,
        END_STATE_BRAKE,
        PROFILE_ACCEL_DECEL,
    ]))
}

/// Encode a run-motor-to-angle command.
///
/// # Frame layout (14 bytes)
///
/// ```text
/// [0-1]   : frame length, little-endian (0x0e, 0x00)
/// [2]     : port output opcode (0x81)
/// [3]     : port code
/// [4]     : execute immediately (0x11)
/// [5]     : motor-angle subcommand (0x0b)
/// [6-7]   : angle, little-endian
/// [8-9]   : reserved (0x00, 0x00)
/// [10]    : duty cycle byte
/// [11]    : max power (0x64)
/// [12]    : end state brake (0x7f)
/// [13]    : accel/decel profile (0x03)
/// ```
///
/// Angles beyond 16 bits wrap silently.
pub fn encode_motor_angle(port: Port, angle: u32, duty_cycle: i8) -> Result<Vec<u8>, ProtocolError> {
    let duty = duty_cycle_byte(duty_cycle)?;
    let [lo, hi] = (angle as u16).to_le_bytes();
    Ok(frame(&[
        MSG_PORT_OUTPUT,
        port.code(),
        EXECUTE_IMMEDIATELY,
        SUBCMD_MOTOR_ANGLE,
        lo,
        hi,
        0x00,
        0x00,
        duty,
        MAX_POWER,
        END_STATE_BRAKE,
        PROFILE_ACCEL_DECEL,
    ]))
}

/// Encode a set-LED-color command.
///
/// # Frame layout (8 bytes)
///
/// ```text
/// [0-1] : frame length, little-endian (0x08, 0x00)
/// [2]   : port output opcode (0x81)
/// [3]   : LED port (0x32)
/// [4]   : execute immediately (0x11)
/// [5]   : set-color subcommand (0x51)
/// [6]   : reserved (0x00)
/// [7]   : color index
/// ```
pub fn encode_led(color: LedColor) -> Vec<u8> {
    frame(&[
        MSG_PORT_OUTPUT,
        LED_PORT,
        EXECUTE_IMMEDIATELY,
        SUBCMD_SET_COLOR,
        0x00,
        color.index(),
    ])
}

/// Duty cycle sign adjustment: 0..=100 encode as themselves, negatives map
/// into the top of the byte range as `0xff + duty`.
fn duty_cycle_byte(duty_cycle: i8) -> Result<u8, ProtocolError> {
    if !(-100..=100).contains(&duty_cycle) {
        return Err(ProtocolError::InvalidDutyCycle(duty_cycle));
    }
    if duty_cycle >= 0 {
        Ok(duty_cycle as u8)
    } else {
        Ok((0xff + i16::from(duty_cycle)) as u8)
    }
}

/// Prefix a frame body with its length header (total length including the
/// two header bytes, little-endian).
fn frame(body: &[u8]) -> Vec<u8> {
    let total = body.len() + 2;
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u16).to_le_bytes());
    frame.extend_from_slice(body);
    frame
}
