/// Square input the YOLOv8 exports are traced with.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Grey used to pad the letterbox borders.
pub const LETTERBOX_COLOR: u8 = 114;
