//! Generation constants: slab thickness, shape limits, retry budgets, object flags.
//!
//! Plain constants with no runtime dependency. The generator, the query layer and the
//! simtest harness all read them from here.

/// Floor and ceiling slab thickness as a fraction of floor-to-floor spacing.
pub const FLOOR_THICK_VAL: f32 = 0.1;

/// Side count used for round (cylinder-like) footprints.
pub const MAX_CYLIN_SIDES: u32 = 36;

/// Number of draw-range slots an interior reserves for batching.
pub const MAX_DRAW_BLOCKS: usize = 8;

/// Hard cap on parts per building (part ids are stored in a byte).
pub const MAX_PARTS: usize = 255;

/// Room ids are stored in a byte, so a floor holds at most this many rooms.
pub const MAX_ROOMS_PER_FLOOR: usize = 256;

/// Floors beyond this index cannot be represented in the lit-by-floor mask.
pub const MAX_LIT_FLOORS: usize = 64;

/// Default interior-wall subdivision threshold (aspect ratio).
pub const DEFAULT_WALL_SPLIT_THRESH: f32 = 4.0;

/// Default number of placement attempts per building.
pub const DEFAULT_NUM_TRIES: u32 = 10;

/// Small positive epsilon used to keep derived boxes strictly normalized.
pub const TOLERANCE: f32 = 1.0e-4;

/// Retry budgets for placement loops.
pub mod tries {
    pub const DOOR: u32 = 10;
    pub const ROOF_DETAIL: u32 = 20;
    pub const STAIRS: u32 = 40;
    pub const ELEVATOR: u32 = 20;
    pub const FURNITURE: u32 = 10;
    pub const PERSON: u32 = 100;
}

/// Wall, door and stair proportions relative to floor spacing.
pub mod proportions {
    /// Interior wall half-thickness.
    pub const WALL_THICK: f32 = 0.025;
    /// Door width.
    pub const DOOR_WIDTH: f32 = 0.5;
    /// Door height (below the ceiling slab).
    pub const DOOR_HEIGHT: f32 = 0.8;
    /// Exterior door thickness.
    pub const DOOR_THICK: f32 = 0.02;
    /// Clearance kept in front of a door (swing region depth).
    pub const DOOR_CLEARANCE: f32 = 0.6;
    /// Stairwell length along the run direction.
    pub const STAIRS_LEN: f32 = 1.6;
    /// Stairwell width.
    pub const STAIRS_WIDTH: f32 = 0.6;
    /// Elevator shaft side.
    pub const ELEVATOR_SIZE: f32 = 0.7;
    /// Hallway width.
    pub const HALL_WIDTH: f32 = 0.9;
    /// Minimum room side length.
    pub const MIN_ROOM_SIDE: f32 = 1.2;
}

/// Room object flag bits.
pub mod obj_flags {
    pub const LIT: u8 = 0x01;
    /// Top of stairs.
    pub const TOS: u8 = 0x02;
    /// Room contains stairs.
    pub const RSTAIRS: u8 = 0x04;
    pub const INVIS: u8 = 0x08;
    pub const NOCOLL: u8 = 0x10;
}

/// Bits of `Building::flags`.
pub mod building_flags {
    pub const IS_HOUSE: u8 = 0x01;
    pub const HAS_CHIMNEY: u8 = 0x02;
    pub const HAS_GARAGE: u8 = 0x04;
    pub const HAS_SHED: u8 = 0x08;
}

/// Texture ids for room objects; resolved to real textures by the renderer.
pub mod obj_tex {
    pub const WOOD: i32 = 1000;
    pub const MARBLE: i32 = 1001;
    pub const LIGHT: i32 = 1002;
    pub const METAL: i32 = 1003;
    pub const PAPER: i32 = 1004;
    pub const DOOR: i32 = 1005;
    pub const WINDOW: i32 = 1006;
}
