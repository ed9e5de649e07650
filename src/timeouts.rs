pub mod ms {
    pub const POLL_INTERVAL: u64 = 100;
    pub const SNAPSHOT_CAPTURE: u64 = 2000;
    pub const PAGE_LOAD_SETTLE: u64 = 300;
    pub const RESPONSE_META_WAIT: u64 = 500;
    pub const DOWNLOAD_POLL: u64 = 250;
}

pub mod secs {
    pub const NAVIGATION: u64 = 30;
    pub const WAIT_VISIBLE: u64 = 30;
    pub const DOWNLOAD: u64 = 60;
    pub const FORM: u64 = 15;
}
