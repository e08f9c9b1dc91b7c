use crate::regs::RegisterAddress;

/// Board-level hardware wired to the chip's I/O ports.
///
/// Implementations are called with the chip lock held and must guard their own state; they
/// must not call back into the [`crate::Mcu`].
pub trait Peripheral: Send + Sync {
    /// An output port changed. `value` is already masked by the port's `DDRx`.
    fn port_changed(&self, port: RegisterAddress, value: u8);

    /// The level driven onto a `PINx` register.
    fn port_value(&self, pin: RegisterAddress) -> u8;
}
