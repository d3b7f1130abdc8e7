use thiserror::Error;

/// Driver failure kinds.
///
/// Initialization errors leave nothing acquired (resources are released
/// in reverse order as the error propagates). [`DriverError::Dma`] is the
/// only render/wait error and is non-fatal: the driver stays usable.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("unsupported hardware: {0}")]
    HardwareUnsupported(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("failed to open the mailbox device: {0}")]
    MailboxOpen(#[source] std::io::Error),
    #[error("mailbox memory allocation failed")]
    MailboxAlloc,
    #[error("mailbox memory lock failed")]
    MailboxLock,
    #[error("failed to map DMA memory: {0}")]
    MapMem(#[source] std::io::Error),
    #[error("failed to map peripheral registers (root or /dev/mem access required): {0}")]
    MapRegisters(#[source] std::io::Error),
    #[error("GPIO pin {pin} has no PWM alternate function on channel {channel}")]
    UnsupportedPin { channel: usize, pin: u8 },
    #[error("PWM setup failed: {0}")]
    PwmSetup(String),
    #[error("DMA transfer error (DEBUG register {debug:#010x})")]
    Dma { debug: u32 },
}

impl From<board::BoardError> for DriverError {
    fn from(err: board::BoardError) -> Self {
        DriverError::HardwareUnsupported(err.to_string())
    }
}

impl From<mbox::MboxError> for DriverError {
    fn from(err: mbox::MboxError) -> Self {
        match err {
            mbox::MboxError::Open(e) => DriverError::MailboxOpen(e),
            mbox::MboxError::Map(e) => DriverError::MapMem(e),
            mbox::MboxError::Property(_) | mbox::MboxError::Request { .. } => {
                DriverError::MailboxAlloc
            }
        }
    }
}
