//! Concrete format drivers.
//!
//! One module per supported archive variant. Each supplies a [`FatDriver`]
//! (or a fixed-archive construction) for the wire format plus an
//! [`ArchiveFormat`] front-end for probing and opening; the shared engine
//! does everything else.
//!
//! [`FatDriver`]: crate::fat::FatDriver
//! [`ArchiveFormat`]: crate::format::ArchiveFormat

pub mod bnk_harry;
pub mod exe_ccaves;
pub mod grp_duke3d;
pub mod pod_tv;
pub mod rff_blood;
pub mod vol_cosmo;
pub mod wad_doom;
