//! Procedural building generation and spatial queries for Skyline.
//!
//! This crate generates buildings (exterior shells, interiors and room contents) from
//! two integer seeds and a material catalog, and answers the queries a city simulation
//! needs against them: sphere collision, segment hits, point containment, occlusion and
//! room lighting. It has no renderer or engine dependency; drawing and lightmaps go
//! through small traits the caller implements.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`building`] | Building record, geometry descriptor, tagged quads, local/world frames |
//! | [`bvh`] | Interior surface BVH and ray casts |
//! | [`collision`] | Sphere, segment and point-containment queries |
//! | [`color`] | RGBA color and random color ranges |
//! | [`config`] | JSON parameter loading and semantic checks |
//! | [`constants`] | Slab fraction, shape limits, retry budgets, object flags |
//! | [`draw`] | Draw producer: exterior, interior, windows and doors into a `DrawBatch` |
//! | [`geom`] | `Cube` axis-aligned box and 2D polygon helpers |
//! | [`interior`] | Rooms, doors, stairwells, elevators, slabs, lit-floor mask |
//! | [`layout`] | Interior layout: floors, room subdivision, doors, stairs, elevators |
//! | [`lighting`] | Room light selection, toggles and volumetric baking |
//! | [`materials`] | Material catalog and global building parameters |
//! | [`occlusion`] | Building occluders and point/cube occlusion tests |
//! | [`persistence`] | Save/restore of building sets by seed records (bincode) |
//! | [`placement`] | Multi-building placement, streaming tiles, stats, set queries |
//! | [`rng`] | Deterministic per-building ChaCha streams |
//! | [`room_geom`] | Room objects (lights, furniture, stairs) and their vertex batches |
//! | [`shape`] | Exterior generation: parts, roofs, roof details, exterior doors |
//! | [`validate`] | Structural checks over generated buildings |

pub mod building;
pub mod bvh;
pub mod collision;
pub mod color;
pub mod config;
pub mod constants;
pub mod draw;
pub mod geom;
pub mod interior;
pub mod layout;
pub mod lighting;
pub mod materials;
pub mod occlusion;
pub mod persistence;
pub mod placement;
pub mod rng;
pub mod room_geom;
pub mod shape;
pub mod validate;
