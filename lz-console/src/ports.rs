//! Serial port listing

use anyhow::Context;
use serialport::{available_ports, SerialPortType};

/// A serial port found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortListing {
    pub name: String,
    pub description: String,
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let label = usb
                .product
                .as_deref()
                .or(usb.manufacturer.as_deref())
                .unwrap_or("USB serial");
            format!("{} ({:04x}:{:04x})", label, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "serial".to_string(),
    }
}

/// Enumerate serial ports, sorted by name
pub fn list_ports() -> anyhow::Result<Vec<PortListing>> {
    let mut ports: Vec<PortListing> = available_ports()
        .context("Failed to enumerate serial ports")?
        .into_iter()
        .map(|p| PortListing {
            description: describe(&p.port_type),
            name: p.port_name,
        })
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}
