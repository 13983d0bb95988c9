//! Serial port transport
//!
//! The engine is generic over any `AsyncRead + AsyncWrite` stream. This
//! module opens the real thing: a native async serial port configured from
//! [`SerialSettings`].

use std::time::Duration;

use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::config::{FlowControl, Parity, SerialSettings, StopBits};
use crate::error::EngineError;

/// Timeout applied to blocking port operations
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

fn data_bits(bits: u8) -> Result<tokio_serial::DataBits, EngineError> {
    match bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(EngineError::InvalidSetting(format!(
            "{} data bits",
            other
        ))),
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(stop_bits: StopBits) -> Self {
        match stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Open and configure a serial port
pub fn open_serial(settings: &SerialSettings) -> Result<SerialStream, EngineError> {
    let mut stream = tokio_serial::new(&settings.port, settings.baud_rate)
        .data_bits(data_bits(settings.data_bits)?)
        .stop_bits(settings.stop_bits.into())
        .parity(settings.parity.into())
        .flow_control(settings.flow_control.into())
        .timeout(PORT_TIMEOUT)
        .open_native_async()?;

    if let Some(dtr) = settings.dtr {
        stream.write_data_terminal_ready(dtr)?;
        debug!("DTR on {} set to {}", settings.port, dtr);
    }
    if let Some(rts) = settings.rts {
        stream.write_request_to_send(rts)?;
        debug!("RTS on {} set to {}", settings.port, rts);
    }

    info!(
        "Opened {} at {} baud, {} data bits, {:?} parity, {:?} stop bits",
        settings.port, settings.baud_rate, settings.data_bits, settings.parity, settings.stop_bits
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_bits_mapping() {
        assert_eq!(data_bits(8).unwrap(), tokio_serial::DataBits::Eight);
        assert_eq!(data_bits(7).unwrap(), tokio_serial::DataBits::Seven);
        assert!(matches!(data_bits(9), Err(EngineError::InvalidSetting(_))));
    }

    #[test]
    fn test_line_setting_conversions() {
        assert_eq!(
            tokio_serial::StopBits::from(StopBits::Two),
            tokio_serial::StopBits::Two
        );
        assert_eq!(
            tokio_serial::Parity::from(Parity::Even),
            tokio_serial::Parity::Even
        );
        assert_eq!(
            tokio_serial::FlowControl::from(FlowControl::Hardware),
            tokio_serial::FlowControl::Hardware
        );
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let settings = SerialSettings::new("/dev/does-not-exist-lz", 9600);
        assert!(open_serial(&settings).is_err());
    }
}
