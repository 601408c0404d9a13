pub mod blkid;
pub mod block_devices;
pub mod btrfs;
pub mod dependencies;
pub mod df;
pub mod encryption;
pub mod files;
pub mod findmnt;
pub mod fuser;
pub mod lsblk;
pub mod mergerfs;
pub mod mkfs;
pub mod mount;
pub mod mountpoint;
pub mod nonraid;
pub mod power;
pub mod snapraid;
pub mod udevadm;
