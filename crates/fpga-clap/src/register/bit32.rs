use super::Register;

/// Convenience `Register<u32>` exposing each of the 32 bits as an
/// independent named bit, with whole-word reset support.
pub struct Bit32Register {
    reg: Register<u32>,
    names: [String; 32],
}

impl Bit32Register {
    pub fn new(name: impl Into<String>) -> Self {
        let mut reg = Register::new(name);
        let mut names: [String; 32] = Default::default();
        for bit in 0..32u8 {
            let field_name = format!("bit{bit}");
            reg.register_bit(field_name.clone(), bit).expect("bit32 registration cannot overlap");
            names[bit as usize] = field_name;
        }
        Self { reg, names }
    }

    pub fn reset(&mut self, initial: u32) {
        self.reg.distribute(initial as u64);
    }

    pub fn set_bit_at(&mut self, bit: u8, value: bool) {
        self.reg.set_bool(&self.names[bit as usize], value);
    }

    pub fn get_bit_at(&self, bit: u8) -> bool {
        self.reg.get_bool(&self.names[bit as usize])
    }

    pub fn get_bits(&self) -> u32 {
        self.reg.compose() as u32
    }

    pub fn set_bits(&mut self, word: u32) {
        self.reg.distribute(word as u64);
    }

    pub fn to_u32(&self) -> u32 {
        self.get_bits()
    }

    pub fn inner(&self) -> &Register<u32> {
        &self.reg
    }

    pub fn inner_mut(&mut self) -> &mut Register<u32> {
        &mut self.reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_bits_round_trip() {
        let mut reg = Bit32Register::new("isr");
        reg.set_bit_at(0, true);
        reg.set_bit_at(5, true);
        assert_eq!(reg.get_bits(), 0b10_0001);
        assert!(reg.get_bit_at(0));
        assert!(!reg.get_bit_at(1));
    }
}
