/// One named `[start, end]` bitfield inside a [`super::Register`].
#[derive(Debug, Clone)]
pub struct RegisterElement {
    pub name: String,
    pub start: u8,
    pub end: u8,
    pub field_index: usize,
}
