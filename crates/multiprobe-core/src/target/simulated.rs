//! In-memory emulation of an nRF programming library.
//!
//! `SimulatedProbe` behaves like a single native probe session: the library has
//! to be opened, an emulator connected, and the device is reached through it.
//! Flash, UICR and RAM are plain byte vectors; flash follows NOR rules (erase to
//! 0xFF, writes can only clear bits). Failures carry the native error codes.

use super::{Arguments, OperationRegistry, TargetApi};
use crate::config::{DeviceFamily, ProbeSettings};
use crate::error::{ErrorKind, RemoteError};
use serde_json::Value;
use tracing::debug;

// nrfjprogdll_err_t values
const INVALID_OPERATION: i32 = -2;
const INVALID_PARAMETER: i32 = -3;
const WRONG_FAMILY_FOR_DEVICE: i32 = -5;
const EMULATOR_NOT_CONNECTED: i32 = -10;
const NO_EMULATOR_CONNECTED: i32 = -13;
const NVMC_ERROR: i32 = -20;
const NOT_AVAILABLE_BECAUSE_PROTECTION: i32 = -90;

const DLL_VERSION: (u32, u32, &str) = (10, 24, "2");
const EMULATOR_SERIALS: [u32; 2] = [682_000_101, 682_000_102];
const MIN_SPEED_KHZ: u32 = 125;
const MAX_SPEED_KHZ: u32 = 50_000;
const DEFAULT_SPEED_KHZ: u32 = 2_000;

const UICR_BASE: u32 = 0x1000_1000;
const UICR_SIZE: usize = 0x1000;
const RAM_BASE: u32 = 0x2000_0000;
const RAM_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Flash,
    Uicr,
    Ram,
}

/// Emulated single-session probe API.
#[derive(Debug)]
pub struct SimulatedProbe {
    family: DeviceFamily,
    dll_open: bool,
    emulator: Option<u32>,
    speed_khz: u32,
    device_connected: bool,
    halted: bool,
    protected: bool,
    page_size: usize,
    flash: Vec<u8>,
    uicr: Vec<u8>,
    ram: Vec<u8>,
}

impl SimulatedProbe {
    /// Create an emulated session for `family`.
    pub fn new(family: DeviceFamily) -> Self {
        let (flash_size, page_size) = flash_geometry(family);
        Self {
            family,
            dll_open: false,
            emulator: None,
            speed_khz: DEFAULT_SPEED_KHZ,
            device_connected: false,
            halted: false,
            protected: false,
            page_size,
            flash: vec![0xFF; flash_size],
            uicr: vec![0xFF; UICR_SIZE],
            ram: vec![0; RAM_SIZE],
        }
    }

    pub fn open(&mut self) -> Result<(), RemoteError> {
        if self.dll_open {
            return Err(invalid_operation("API is already open"));
        }
        self.dll_open = true;
        debug!("Simulated probe library opened for {}", self.family);
        Ok(())
    }

    /// Close the library. Closing twice is harmless.
    pub fn close(&mut self) {
        self.emulator = None;
        self.device_connected = false;
        self.dll_open = false;
    }

    pub fn connect_to_emu(&mut self, serial_number: Option<u32>, speed_khz: u32) -> Result<(), RemoteError> {
        self.require_open()?;
        if self.emulator.is_some() {
            return Err(invalid_operation("already connected to an emulator"));
        }
        if !(MIN_SPEED_KHZ..=MAX_SPEED_KHZ).contains(&speed_khz) {
            return Err(RemoteError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "jlink_speed_khz must be between {} and {}, got {}",
                    MIN_SPEED_KHZ, MAX_SPEED_KHZ, speed_khz
                ),
            )
            .with_code(INVALID_PARAMETER));
        }
        let serial = match serial_number {
            Some(snr) if EMULATOR_SERIALS.contains(&snr) => snr,
            Some(snr) => {
                return Err(RemoteError::new(
                    ErrorKind::NotConnected,
                    format!("emulator {} is not connected to the PC", snr),
                )
                .with_code(EMULATOR_NOT_CONNECTED))
            }
            None => EMULATOR_SERIALS[0],
        };
        self.emulator = Some(serial);
        self.speed_khz = speed_khz;
        Ok(())
    }

    pub fn read_u32(&mut self, addr: u32) -> Result<u32, RemoteError> {
        check_aligned(addr)?;
        let bytes = self.read(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u32(&mut self, addr: u32, data: u32) -> Result<(), RemoteError> {
        check_aligned(addr)?;
        self.write(addr, &data.to_le_bytes())
    }

    pub fn read(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, RemoteError> {
        self.require_device()?;
        let (region, offset) = self.locate(addr, len)?;
        Ok(self.region(region)[offset..offset + len].to_vec())
    }

    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), RemoteError> {
        self.require_device()?;
        if data.is_empty() {
            return Err(RemoteError::invalid_argument("data must not be empty").with_code(INVALID_PARAMETER));
        }
        let (region, offset) = self.locate(addr, data.len())?;
        let target = &mut self.region_mut(region)[offset..offset + data.len()];

        if region == Region::Ram {
            target.copy_from_slice(data);
            return Ok(());
        }
        // NOR flash: programming can only clear bits.
        if target.iter().zip(data).any(|(old, new)| old & new != *new) {
            return Err(RemoteError::new(
                ErrorKind::Api,
                format!("flash at 0x{:08X} must be erased before writing", addr),
            )
            .with_code(NVMC_ERROR));
        }
        target.copy_from_slice(data);
        Ok(())
    }

    pub fn erase_all(&mut self) -> Result<(), RemoteError> {
        self.require_device()?;
        self.flash.fill(0xFF);
        self.uicr.fill(0xFF);
        Ok(())
    }

    pub fn erase_page(&mut self, addr: u32) -> Result<(), RemoteError> {
        self.require_device()?;
        let (region, offset) = self.locate(addr, 1)?;
        match region {
            Region::Flash => {
                let start = offset - offset % self.page_size;
                let end = start + self.page_size;
                self.flash[start..end].fill(0xFF);
                Ok(())
            }
            Region::Uicr => {
                self.uicr.fill(0xFF);
                Ok(())
            }
            Region::Ram => Err(RemoteError::new(
                ErrorKind::InvalidArgument,
                format!("address 0x{:08X} is not in flash", addr),
            )
            .with_code(INVALID_PARAMETER)),
        }
    }

    /// Erase everything and lift readback protection.
    pub fn recover(&mut self) -> Result<(), RemoteError> {
        self.require_emulator()?;
        self.protected = false;
        self.device_connected = true;
        self.flash.fill(0xFF);
        self.uicr.fill(0xFF);
        self.ram.fill(0);
        self.halted = false;
        Ok(())
    }

    fn require_open(&self) -> Result<(), RemoteError> {
        if !self.dll_open {
            return Err(invalid_operation("open() has not been called"));
        }
        Ok(())
    }

    fn require_emulator(&self) -> Result<(), RemoteError> {
        self.require_open()?;
        if self.emulator.is_none() {
            return Err(RemoteError::new(
                ErrorKind::NotConnected,
                "connect_to_emu_with_snr() or connect_to_emu_without_snr() has not been called",
            )
            .with_code(INVALID_OPERATION));
        }
        Ok(())
    }

    /// Memory access connects to the device implicitly, like the native library.
    fn require_device(&mut self) -> Result<(), RemoteError> {
        self.require_emulator()?;
        if self.protected {
            return Err(protected());
        }
        self.device_connected = true;
        Ok(())
    }

    fn locate(&self, addr: u32, len: usize) -> Result<(Region, usize), RemoteError> {
        let spans = [
            (Region::Flash, 0u32, self.flash.len()),
            (Region::Uicr, UICR_BASE, UICR_SIZE),
            (Region::Ram, RAM_BASE, RAM_SIZE),
        ];
        for (region, base, size) in spans {
            if addr >= base && ((addr - base) as usize) < size {
                let offset = (addr - base) as usize;
                if offset.checked_add(len).map_or(true, |end| end > size) {
                    break;
                }
                return Ok((region, offset));
            }
        }
        Err(RemoteError::new(
            ErrorKind::OutOfRange,
            format!("range 0x{:08X}+{} is outside the memory map", addr, len),
        )
        .with_code(INVALID_PARAMETER))
    }

    fn region(&self, region: Region) -> &[u8] {
        match region {
            Region::Flash => &self.flash,
            Region::Uicr => &self.uicr,
            Region::Ram => &self.ram,
        }
    }

    fn region_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::Flash => &mut self.flash,
            Region::Uicr => &mut self.uicr,
            Region::Ram => &mut self.ram,
        }
    }
}

fn flash_geometry(family: DeviceFamily) -> (usize, usize) {
    match family {
        DeviceFamily::Nrf51 => (256 * 1024, 1024),
        DeviceFamily::Nrf52 | DeviceFamily::Unknown => (512 * 1024, 4096),
        DeviceFamily::Nrf53 | DeviceFamily::Nrf91 => (1024 * 1024, 4096),
    }
}

fn check_aligned(addr: u32) -> Result<(), RemoteError> {
    if addr % 4 != 0 {
        return Err(RemoteError::new(
            ErrorKind::InvalidArgument,
            format!("address 0x{:08X} is not 32-bit aligned", addr),
        )
        .with_code(INVALID_PARAMETER));
    }
    Ok(())
}

fn invalid_operation(message: &str) -> RemoteError {
    RemoteError::new(ErrorKind::InvalidOperation, message).with_code(INVALID_OPERATION)
}

fn protected() -> RemoteError {
    RemoteError::new(
        ErrorKind::Protected,
        "the operation is not available due to readback protection",
    )
    .with_code(NOT_AVAILABLE_BECAUSE_PROTECTION)
}

fn parse_family(value: &Value) -> Result<DeviceFamily, RemoteError> {
    let family = match value {
        Value::String(s) => DeviceFamily::parse(s),
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).and_then(DeviceFamily::from_value),
        _ => None,
    };
    family.ok_or_else(|| {
        RemoteError::invalid_argument(format!("invalid device family: {}", value)).with_code(INVALID_PARAMETER)
    })
}

impl TargetApi for SimulatedProbe {
    fn create(settings: &ProbeSettings) -> Result<Self, RemoteError> {
        if let Some(path) = &settings.library_path {
            if !path.exists() {
                return Err(RemoteError::new(
                    ErrorKind::Io,
                    format!("probe library not found at {}", path.display()),
                ));
            }
        }
        Ok(Self::new(settings.device_family))
    }

    fn registry() -> OperationRegistry<Self> {
        OperationRegistry::new()
            .register("open", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.open()
            })
            .register("close", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.close();
                Ok(())
            })
            .register("is_open", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                Ok(p.dll_open)
            })
            .register("dll_version", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_open()?;
                Ok(DLL_VERSION)
            })
            .register("read_device_family", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                Ok(p.family.as_str())
            })
            .register("select_family", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["family"])?;
                let family = parse_family(&args.required::<Value>(0, "family")?)?;
                p.require_open()?;
                if p.device_connected && family != p.family {
                    return Err(RemoteError::new(
                        ErrorKind::InvalidOperation,
                        format!("connected device is an {}, not an {}", p.family, family),
                    )
                    .with_code(WRONG_FAMILY_FOR_DEVICE));
                }
                p.family = family;
                Ok(())
            })
            .register("enum_emu_snr", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_open()?;
                Ok(EMULATOR_SERIALS.to_vec())
            })
            .register("connect_to_emu_without_snr", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["jlink_speed_khz"])?;
                let speed = args.optional(0, "jlink_speed_khz")?.unwrap_or(DEFAULT_SPEED_KHZ);
                p.connect_to_emu(None, speed)
            })
            .register("connect_to_emu_with_snr", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["serial_number", "jlink_speed_khz"])?;
                let snr: u32 = args.required(0, "serial_number")?;
                let speed = args.optional(1, "jlink_speed_khz")?.unwrap_or(DEFAULT_SPEED_KHZ);
                p.connect_to_emu(Some(snr), speed)
            })
            .register("is_connected_to_emu", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_open()?;
                Ok(p.emulator.is_some())
            })
            .register("read_connected_emu_snr", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_emulator()?;
                p.emulator.ok_or_else(|| {
                    RemoteError::new(ErrorKind::NotConnected, "no emulator connected")
                        .with_code(NO_EMULATOR_CONNECTED)
                })
            })
            .register("disconnect_from_emu", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_open()?;
                p.emulator = None;
                p.device_connected = false;
                Ok(())
            })
            .register("connect_to_device", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_emulator()?;
                if p.device_connected {
                    return Err(invalid_operation("already connected to the device"));
                }
                if p.protected {
                    return Err(protected());
                }
                p.device_connected = true;
                Ok(())
            })
            .register("is_connected_to_device", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_emulator()?;
                Ok(p.device_connected)
            })
            .register("disconnect_from_device", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_emulator()?;
                p.device_connected = false;
                Ok(())
            })
            .register("read_u32", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["addr"])?;
                p.read_u32(args.required(0, "addr")?)
            })
            .register("write_u32", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["addr", "data", "control"])?;
                let addr = args.required(0, "addr")?;
                let data = args.required(1, "data")?;
                let _control: Option<bool> = args.optional(2, "control")?;
                p.write_u32(addr, data)
            })
            .register("read", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["addr", "data_len"])?;
                p.read(args.required(0, "addr")?, args.required(1, "data_len")?)
            })
            .register("write", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["addr", "data", "control"])?;
                let addr = args.required(0, "addr")?;
                let data: Vec<u8> = args.required(1, "data")?;
                let _control: Option<bool> = args.optional(2, "control")?;
                p.write(addr, &data)
            })
            .register("erase_all", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.erase_all()
            })
            .register("erase_page", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["addr"])?;
                p.erase_page(args.required(0, "addr")?)
            })
            .register("erase_uicr", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                p.uicr.fill(0xFF);
                Ok(())
            })
            .register("readback_protect", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["desired_protection_level"])?;
                let level: String = args.required(0, "desired_protection_level")?;
                p.require_device()?;
                match level.to_uppercase().as_str() {
                    "ALL" => {
                        p.protected = true;
                        p.device_connected = false;
                        Ok(())
                    }
                    "NONE" => Err(RemoteError::invalid_argument(
                        "protection can only be removed with recover()",
                    )
                    .with_code(INVALID_PARAMETER)),
                    other => Err(RemoteError::invalid_argument(format!(
                        "invalid protection level: {}",
                        other
                    ))
                    .with_code(INVALID_PARAMETER)),
                }
            })
            .register("readback_status", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_emulator()?;
                Ok(if p.protected { "ALL" } else { "NONE" })
            })
            .register("recover", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.recover()
            })
            .register("sys_reset", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                p.ram.fill(0);
                p.halted = false;
                Ok(())
            })
            .register("debug_reset", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                p.ram.fill(0);
                Ok(())
            })
            .register("halt", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                p.halted = true;
                Ok(())
            })
            .register("is_halted", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                Ok(p.halted)
            })
            .register("go", |p: &mut Self, args: &Arguments| {
                args.expect_params(&[])?;
                p.require_device()?;
                p.halted = false;
                Ok(())
            })
            .register("run", |p: &mut Self, args: &Arguments| {
                args.expect_params(&["pc", "sp"])?;
                let pc: u32 = args.required(0, "pc")?;
                let sp: u32 = args.required(1, "sp")?;
                p.require_device()?;
                check_aligned(sp)?;
                if pc as usize >= p.flash.len() {
                    return Err(RemoteError::new(
                        ErrorKind::OutOfRange,
                        format!("pc 0x{:08X} is outside flash", pc),
                    )
                    .with_code(INVALID_PARAMETER));
                }
                p.halted = false;
                Ok(())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connected() -> SimulatedProbe {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        probe.connect_to_emu(None, DEFAULT_SPEED_KHZ).unwrap();
        probe
    }

    fn call(probe: &mut SimulatedProbe, name: &str, args: Value) -> Result<Option<Value>, RemoteError> {
        let positional = args.as_array().cloned().unwrap_or_default();
        SimulatedProbe::registry().invoke(probe, name, &Arguments::new(positional, Default::default()))
    }

    #[test]
    fn test_memory_requires_open_library() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        let err = probe.read_u32(0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOperation);
        assert_eq!(err.code, Some(INVALID_OPERATION));
    }

    #[test]
    fn test_memory_requires_emulator() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        let err = probe.read_u32(0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConnected);
    }

    #[test]
    fn test_open_twice_fails() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        assert_eq!(probe.open().unwrap_err().kind, ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_flash_write_and_read_back() {
        let mut probe = connected();
        assert_eq!(probe.read_u32(0x1000).unwrap(), 0xFFFF_FFFF);
        probe.write_u32(0x1000, 0xDEAD_BEEF).unwrap();
        assert_eq!(probe.read_u32(0x1000).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_flash_write_without_erase_is_nvmc_error() {
        let mut probe = connected();
        probe.write_u32(0x2000, 0x0000_0000).unwrap();
        let err = probe.write_u32(0x2000, 0x1234_5678).unwrap_err();
        assert_eq!(err.code, Some(NVMC_ERROR));

        probe.erase_page(0x2000).unwrap();
        probe.write_u32(0x2000, 0x1234_5678).unwrap();
        assert_eq!(probe.read_u32(0x2000).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_ram_overwrites_freely() {
        let mut probe = connected();
        probe.write_u32(RAM_BASE, 1).unwrap();
        probe.write_u32(RAM_BASE, 2).unwrap();
        assert_eq!(probe.read_u32(RAM_BASE).unwrap(), 2);
    }

    #[test]
    fn test_unaligned_and_out_of_range() {
        let mut probe = connected();
        assert_eq!(probe.read_u32(0x1001).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(probe.read_u32(0x0FFF_0000).unwrap_err().kind, ErrorKind::OutOfRange);
        // Straddling the end of RAM.
        let last = RAM_BASE + RAM_SIZE as u32 - 2;
        assert_eq!(probe.read(last, 4).unwrap_err().kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn test_erase_uicr_restores_erased_state() {
        let mut probe = connected();
        probe.write_u32(UICR_BASE, 0x0000_00FF).unwrap();
        assert_eq!(probe.read_u32(UICR_BASE).unwrap(), 0x0000_00FF);

        call(&mut probe, "erase_uicr", json!([])).unwrap();
        assert_eq!(probe.read_u32(UICR_BASE).unwrap(), 0xFFFF_FFFF);
        assert!(SimulatedProbe::registry().names().contains("erase_uicr"));
    }

    #[test]
    fn test_huge_length_is_out_of_range() {
        let mut probe = connected();
        let err = call(&mut probe, "read", json!([4, u64::MAX])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
        assert_eq!(err.code, Some(INVALID_PARAMETER));

        let err = probe.read(RAM_BASE, usize::MAX).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn test_surplus_arguments_rejected() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        let err = call(&mut probe, "is_open", json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        // Every zero-argument operation checks before touching state.
        for name in ["is_open", "enum_emu_snr", "erase_all", "recover", "halt", "go"] {
            let err = call(&mut probe, name, json!([1])).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "{}", name);
        }
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let mut probe = connected();
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("bogus".to_string(), json!(1));
        let err = SimulatedProbe::registry()
            .invoke(&mut probe, "read_u32", &Arguments::new(vec![json!(0)], kwargs))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("bogus"));

        let mut kwargs = serde_json::Map::new();
        kwargs.insert("addr".to_string(), json!(0));
        let word = SimulatedProbe::registry()
            .invoke(&mut probe, "read_u32", &Arguments::new(vec![], kwargs))
            .unwrap();
        assert_eq!(word, Some(json!(0xFFFF_FFFFu32)));
    }

    #[test]
    fn test_readback_protection_and_recover() {
        let mut probe = connected();
        probe.write_u32(0x0, 0x0000_0001).unwrap();
        call(&mut probe, "readback_protect", json!(["ALL"])).unwrap();

        let err = probe.read_u32(0x0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Protected);
        assert_eq!(err.code, Some(NOT_AVAILABLE_BECAUSE_PROTECTION));
        assert_eq!(call(&mut probe, "readback_status", json!([])).unwrap(), Some(json!("ALL")));

        probe.recover().unwrap();
        assert_eq!(probe.read_u32(0x0).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_connect_with_unknown_serial() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        let err = call(&mut probe, "connect_to_emu_with_snr", json!([1])).unwrap_err();
        assert_eq!(err.code, Some(EMULATOR_NOT_CONNECTED));

        call(&mut probe, "connect_to_emu_with_snr", json!([EMULATOR_SERIALS[1]])).unwrap();
        assert_eq!(
            call(&mut probe, "read_connected_emu_snr", json!([])).unwrap(),
            Some(json!(EMULATOR_SERIALS[1]))
        );
    }

    #[test]
    fn test_speed_limits() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        let err = call(&mut probe, "connect_to_emu_without_snr", json!([10])).unwrap_err();
        assert_eq!(err.code, Some(INVALID_PARAMETER));
    }

    #[test]
    fn test_select_family_accepts_name_and_number() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Unknown);
        probe.open().unwrap();
        call(&mut probe, "select_family", json!(["nrf91"])).unwrap();
        assert_eq!(probe.family, DeviceFamily::Nrf91);
        call(&mut probe, "select_family", json!([1])).unwrap();
        assert_eq!(probe.family, DeviceFamily::Nrf52);
        assert!(call(&mut probe, "select_family", json!(["nrf00"])).is_err());
    }

    #[test]
    fn test_dll_version_shape() {
        let mut probe = SimulatedProbe::new(DeviceFamily::Nrf52);
        probe.open().unwrap();
        assert_eq!(
            call(&mut probe, "dll_version", json!([])).unwrap(),
            Some(json!([10, 24, "2"]))
        );
    }

    #[test]
    fn test_create_rejects_missing_library() {
        let settings = ProbeSettings::new(DeviceFamily::Nrf52).with_library_path("/nonexistent/libjlinkarm.so");
        let err = SimulatedProbe::create(&settings).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }

    #[test]
    fn test_halt_and_go() {
        let mut probe = connected();
        call(&mut probe, "halt", json!([])).unwrap();
        assert_eq!(call(&mut probe, "is_halted", json!([])).unwrap(), Some(json!(true)));
        call(&mut probe, "go", json!([])).unwrap();
        assert_eq!(call(&mut probe, "is_halted", json!([])).unwrap(), Some(json!(false)));
    }
}
