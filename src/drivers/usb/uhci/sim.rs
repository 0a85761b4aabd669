//! 테스트용 UHCI 시뮬레이터
//!
//! 레지스터 파일과 단순한 USB 디바이스 모델을 흉내 내는 `UhciIo` 구현입니다.
//! `delay_ms` 동안 Frame List를 스캔하여 스케줄된 TD 체인을 실행하므로,
//! 제어 전송 엔진과 열거 상태 기계를 하드웨어 없이 구동할 수 있습니다.

use alloc::vec::Vec;

use super::hw::UhciIo;
use super::schedule::{FRAME_LIST, FRAME_LIST_ENTRIES};
use super::td::{QueueHead, TransferDescriptor, TD_STATUS_ACTIVE, TD_STATUS_IOC};
use super::{
    CMD_GLOBAL_RESET, CMD_RUN_STOP, FRNUM_MASK, PORTSC_CONNECT, PORTSC_ENABLE, PORTSC_RESET,
    REG_FLBASEADD, REG_FRNUM, REG_PORTSC_BASE, REG_USBCMD, REG_USBINTR, REG_USBSTS, STS_HALTED,
    STS_USBINT,
};
use crate::memory::dma;

/// 시뮬레이터 디바이스의 벤더 ID
pub const SIM_VENDOR_ID: u16 = 0x1A2B;
const SIM_PRODUCT_ID: u16 = 0x0001;

/// 시뮬레이터가 포트 0에 연결하는 디바이스 종류
#[derive(Clone, Copy, PartialEq, Eq)]
enum SimDeviceKind {
    BootKeyboard,
    /// 벤더 디스크립터로 채워져 인터페이스가 blob 후반에 있는 부트 키보드
    VendorPaddedKeyboard,
    MassStorage,
    CorruptConfig,
}

struct SimDevice {
    kind: SimDeviceKind,
    /// 현재 디바이스 주소 (SET_ADDRESS의 STATUS 단계 완료 시 적용)
    address: u8,
    pending_address: Option<u8>,
    /// 마지막 SETUP 패킷 (DATA 단계 응답 결정)
    last_setup: [u8; 8],
}

/// 기록된 제어 요청 (request_type, request, value)
type RequestRecord = (u8, u8, u16);

pub struct SimController {
    usbcmd: u16,
    usbsts: u16,
    usbintr: u16,
    frnum: u16,
    flbaseadd: u32,
    portsc_written: [u16; 2],
    device: Option<SimDevice>,
    /// false면 스케줄을 실행하지 않음 (stuck 하드웨어 모델)
    execute_schedule: bool,
    requests: Vec<RequestRecord>,
    status_acks: usize,
}

impl SimController {
    fn new(device: Option<SimDeviceKind>, execute_schedule: bool) -> Self {
        Self {
            usbcmd: 0,
            usbsts: 0,
            usbintr: 0,
            frnum: 0,
            flbaseadd: 0,
            portsc_written: [0; 2],
            device: device.map(|kind| SimDevice {
                kind,
                address: 0,
                pending_address: None,
                last_setup: [0; 8],
            }),
            execute_schedule,
            requests: Vec::new(),
            status_acks: 0,
        }
    }

    /// 디바이스 없음, 스케줄 실행 없음
    pub fn new_empty() -> Self {
        Self::new(None, false)
    }

    /// 레지스터는 동작하지만 TD를 전혀 실행하지 않는 컨트롤러
    pub fn new_stuck() -> Self {
        Self::new(Some(SimDeviceKind::BootKeyboard), false)
    }

    /// 포트 0에 HID 부트 키보드 연결
    pub fn new_boot_keyboard() -> Self {
        Self::new(Some(SimDeviceKind::BootKeyboard), true)
    }

    /// 구성 blob이 벤더 디스크립터로 길어진 부트 키보드 연결
    pub fn new_vendor_padded_keyboard() -> Self {
        Self::new(Some(SimDeviceKind::VendorPaddedKeyboard), true)
    }

    /// 포트 0에 대용량 저장장치 연결
    pub fn new_mass_storage() -> Self {
        Self::new(Some(SimDeviceKind::MassStorage), true)
    }

    /// 구성 blob이 손상된 디바이스 (오프셋 20에 길이 0 디스크립터)
    pub fn new_corrupt_config() -> Self {
        Self::new(Some(SimDeviceKind::CorruptConfig), true)
    }

    /// 기록된 SET_ADDRESS 요청 확인
    pub fn saw_set_address(&self, address: u8) -> bool {
        self.requests
            .iter()
            .any(|&(rt, r, v)| rt == 0x00 && r == 0x05 && v == address as u16)
    }

    /// 기록된 SET_CONFIGURATION 요청 확인
    pub fn saw_set_configuration(&self, value: u8) -> bool {
        self.requests
            .iter()
            .any(|&(rt, r, v)| rt == 0x00 && r == 0x09 && v == value as u16)
    }

    /// 상태 레지스터에 인터럽트 비트 설정 (디스패처 테스트용)
    pub fn raise_interrupt(&mut self, bits: u16) {
        self.usbsts |= bits;
    }

    /// USBSTS에 대한 ack 쓰기 횟수
    pub fn status_ack_count(&self) -> usize {
        self.status_acks
    }

    /// 한 번의 스케줄 스윕: 모든 Frame List 엔트리의 QH 체인을 실행
    fn step(&mut self) {
        if !self.execute_schedule || self.usbcmd & CMD_RUN_STOP == 0 {
            return;
        }
        for slot in 0..FRAME_LIST_ENTRIES {
            let entry = FRAME_LIST.entry(slot);
            if entry & super::LINK_TERMINATE != 0 {
                continue;
            }
            self.run_qh(entry & !0xF);
        }
    }

    fn run_qh(&mut self, qh_phys: u32) {
        let qh = unsafe { &*(dma::phys_to_virt(qh_phys) as *const QueueHead) };
        let mut link = qh.vertical_link();
        // TD 체인 길이 상한 (링크 오류 시 무한 루프 방지)
        for _ in 0..8 {
            if link & super::LINK_TERMINATE != 0 {
                break;
            }
            let td = unsafe { &*(dma::phys_to_virt(link & !0xF) as *const TransferDescriptor) };
            if td.is_active() {
                self.run_td(td);
            }
            link = td.link();
        }
    }

    fn run_td(&mut self, td: &TransferDescriptor) {
        let token = td.token();
        let pid = (token & 0xFF) as u8;
        let address = ((token >> 8) & 0x7F) as u8;
        let endpoint = ((token >> 15) & 0x0F) as u8;
        let encoded_len = token >> 21;
        let max_len = if encoded_len == 0x7FF {
            0usize
        } else {
            encoded_len as usize + 1
        };

        // 인터럽트 파이프(EP != 0)는 실행하지 않음: 파이프 테스트가 완료
        // 상태를 직접 주입함
        if endpoint != 0 {
            return;
        }

        let device = match &mut self.device {
            Some(d) if d.address == address => d,
            // 주소 불일치: 응답 없음 (Active 유지 → 타임아웃)
            _ => return,
        };

        let buffer_virt = |phys: u32| dma::phys_to_virt(phys);

        let mut actual = max_len;
        match pid {
            // SETUP
            0x2D => {
                let src = buffer_virt(td.buffer());
                unsafe {
                    core::ptr::copy_nonoverlapping(src, device.last_setup.as_mut_ptr(), 8);
                }
                let request_type = device.last_setup[0];
                let request = device.last_setup[1];
                let value = u16::from_le_bytes([device.last_setup[2], device.last_setup[3]]);
                self.requests.push((request_type, request, value));

                if request_type == 0x00 && request == 0x05 {
                    // SET_ADDRESS: STATUS 단계 완료 시 적용
                    device.pending_address = Some(value as u8);
                }
                actual = 8;
            }
            // IN: DATA 단계 응답 또는 STATUS 단계
            0x69 => {
                if max_len == 0 {
                    // STATUS 단계 (host-to-device 요청의 종료)
                    if let Some(pending) = device.pending_address.take() {
                        device.address = pending;
                    }
                } else {
                    let response = device_response(device);
                    let copy_len = max_len.min(response.len());
                    let dst = buffer_virt(td.buffer());
                    unsafe {
                        core::ptr::copy_nonoverlapping(response.as_ptr(), dst, copy_len);
                    }
                    actual = copy_len;
                }
            }
            // OUT: device-to-host 요청의 STATUS 단계
            0xE1 => {
                if let Some(pending) = device.pending_address.take() {
                    device.address = pending;
                }
            }
            _ => return,
        }

        complete_td(td, actual);
        if td.control_status() & TD_STATUS_IOC != 0 {
            self.usbsts |= STS_USBINT;
        }
    }
}

/// TD를 성공 상태로 완료 (Active 클리어, 실제 길이 기록)
fn complete_td(td: &TransferDescriptor, actual: usize) {
    let encoded = if actual == 0 { 0x7FF } else { (actual - 1) as u32 };
    let status = td.control_status();
    td.set_control_status((status & !TD_STATUS_ACTIVE & !0x7FF) | encoded);
}

/// 현재 SETUP 패킷에 대한 DATA 단계 응답 바이트
fn device_response(device: &SimDevice) -> Vec<u8> {
    let request_type = device.last_setup[0];
    let request = device.last_setup[1];
    let descriptor_type = device.last_setup[3];

    if request_type == 0x80 && request == 0x06 {
        match descriptor_type {
            0x01 => device_descriptor_bytes(),
            0x02 => config_blob(device.kind),
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    }
}

fn device_descriptor_bytes() -> Vec<u8> {
    let mut d = Vec::with_capacity(18);
    d.extend_from_slice(&[18, 0x01]); // length, type
    d.extend_from_slice(&0x0110u16.to_le_bytes()); // USB 1.1
    d.extend_from_slice(&[0, 0, 0, 8]); // class/subclass/protocol (인터페이스 정의), maxpkt 8
    d.extend_from_slice(&SIM_VENDOR_ID.to_le_bytes());
    d.extend_from_slice(&SIM_PRODUCT_ID.to_le_bytes());
    d.extend_from_slice(&0x0100u16.to_le_bytes()); // device version
    d.extend_from_slice(&[0, 0, 0, 1]); // strings, num_configurations
    d
}

fn config_blob(kind: SimDeviceKind) -> Vec<u8> {
    let mut blob = Vec::new();
    match kind {
        SimDeviceKind::BootKeyboard => {
            // config(9) + interface(9) + HID(9) + endpoint(7) = 34
            blob.extend_from_slice(&[9, 0x02, 34, 0, 1, 1, 0, 0xA0, 50]);
            blob.extend_from_slice(&[9, 0x04, 0, 0, 1, 0x03, 0x01, 0x01, 0]);
            blob.extend_from_slice(&[9, 0x21, 0x11, 0x01, 0, 1, 0x22, 63, 0]);
            blob.extend_from_slice(&[7, 0x05, 0x81, 0x03, 8, 0, 10]);
        }
        SimDeviceKind::VendorPaddedKeyboard => {
            // config(9) + 벤더 디스크립터 10개(250) + interface(9) + endpoint(7) = 275
            blob.extend_from_slice(&[9, 0x02, 0, 0, 1, 1, 0, 0xA0, 50]);
            for _ in 0..10 {
                let mut vendor = [0u8; 25];
                vendor[0] = 25;
                vendor[1] = 0xFF;
                blob.extend_from_slice(&vendor);
            }
            blob.extend_from_slice(&[9, 0x04, 0, 0, 1, 0x03, 0x01, 0x01, 0]);
            blob.extend_from_slice(&[7, 0x05, 0x81, 0x03, 8, 0, 10]);
            let total = (blob.len() as u16).to_le_bytes();
            blob[2..4].copy_from_slice(&total);
        }
        SimDeviceKind::MassStorage => {
            // config(9) + interface(9) + bulk IN(7) + bulk OUT(7) = 32
            blob.extend_from_slice(&[9, 0x02, 32, 0, 1, 1, 0, 0xA0, 50]);
            blob.extend_from_slice(&[9, 0x04, 0, 0, 2, 0x08, 0x06, 0x50, 0]);
            blob.extend_from_slice(&[7, 0x05, 0x81, 0x02, 64, 0, 0]);
            blob.extend_from_slice(&[7, 0x05, 0x02, 0x02, 64, 0, 0]);
        }
        SimDeviceKind::CorruptConfig => {
            // config(9) + 정크 디스크립터(11) 후 오프셋 20에 길이 0
            blob.extend_from_slice(&[9, 0x02, 30, 0, 1, 1, 0, 0xA0, 50]);
            blob.extend_from_slice(&[11, 0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
            blob.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        }
    }
    blob
}

impl UhciIo for SimController {
    fn read16(&mut self, offset: u16) -> u16 {
        match offset {
            REG_USBCMD => self.usbcmd,
            REG_USBSTS => self.usbsts,
            REG_USBINTR => self.usbintr,
            REG_FRNUM => self.frnum & FRNUM_MASK,
            o if o >= REG_PORTSC_BASE && o < REG_PORTSC_BASE + 4 => {
                let port = ((o - REG_PORTSC_BASE) / 2) as usize;
                let mut value = self.portsc_written[port] & (PORTSC_ENABLE | PORTSC_RESET);
                // 디바이스는 포트 0에만 연결됨
                if port == 0 && self.device.is_some() {
                    value |= PORTSC_CONNECT;
                }
                value
            }
            _ => 0,
        }
    }

    fn write16(&mut self, offset: u16, value: u16) {
        match offset {
            REG_USBCMD => {
                if value & CMD_GLOBAL_RESET != 0 {
                    // 글로벌 리셋: 컨트롤러 정지 상태로
                    self.usbsts = STS_HALTED;
                    self.frnum = 0;
                }
                if value & CMD_RUN_STOP != 0 {
                    self.usbsts &= !STS_HALTED;
                }
                self.usbcmd = value;
            }
            REG_USBSTS => {
                // write-1-to-clear
                self.usbsts &= !value;
                self.status_acks += 1;
            }
            REG_USBINTR => self.usbintr = value,
            REG_FRNUM => self.frnum = value & FRNUM_MASK,
            o if o >= REG_PORTSC_BASE && o < REG_PORTSC_BASE + 4 => {
                let port = ((o - REG_PORTSC_BASE) / 2) as usize;
                self.portsc_written[port] = value;
            }
            _ => {}
        }
    }

    fn read32(&mut self, offset: u16) -> u32 {
        match offset {
            REG_FLBASEADD => self.flbaseadd,
            _ => 0,
        }
    }

    fn write32(&mut self, offset: u16, value: u32) {
        if offset == REG_FLBASEADD {
            self.flbaseadd = value;
        }
    }

    fn delay_ms(&mut self, ms: u64) {
        for _ in 0..ms {
            self.frnum = (self.frnum + 1) & FRNUM_MASK;
            self.step();
        }
    }
}
