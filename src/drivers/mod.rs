//! 하드웨어 드라이버 모듈
//!
//! 이 모듈은 다양한 하드웨어 장치의 드라이버를 포함합니다.

pub mod keyboard;
pub mod pci;
pub mod serial;
pub mod timer;
pub mod usb;
