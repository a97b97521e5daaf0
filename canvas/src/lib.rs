//! Shared document model for the collaborative whiteboard.
//!
//! This crate is pure and I/O-free. The sync server uses it as the
//! authoritative board model, and clients use the same types to keep an
//! optimistic local copy that converges with the server's broadcasts.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`doc`] | Shapes, sparse updates, typed props, and the in-memory [`doc::DocStore`] |
//! | [`camera`] | Pan/zoom camera and coordinate conversions |
//! | [`geom`] | Bounding boxes, hit-testing, and marquee (box) selection |
//! | [`order`] | Z-index reordering (front/back/forward/backward) |
//! | [`group`] | Grouping and selection closure over groups |
//! | [`lock`] | Per-shape exclusive locks with TTL and disconnect cleanup |
//! | [`presence`] | Live cursors and staleness sweeping |
//! | [`history`] | Per-user undo/redo reconciled against concurrent writers |
//! | [`sync`] | Optimistic client state merged with remote updates |
//! | [`consts`] | Shared numeric constants (zoom limits, TTLs, slop) |

pub mod camera;
pub mod consts;
pub mod doc;
pub mod geom;
pub mod group;
pub mod history;
pub mod lock;
pub mod order;
pub mod presence;
pub mod sync;
