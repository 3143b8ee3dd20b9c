// Page shell bundled into the binary
// Author: kelexine (https://github.com/kelexine)

use phf::phf_map;

pub struct BundledAsset {
    pub content_type: &'static str,
    pub body: &'static [u8],
}

const INDEX_HTML: BundledAsset = BundledAsset {
    content_type: "text/html; charset=utf-8",
    body: include_bytes!("../../static/index.html"),
};

/// Core assets served when no remote origin is configured.
static BUNDLED_ASSETS: phf::Map<&'static str, BundledAsset> = phf_map! {
    "/" => INDEX_HTML,
    "/index.html" => INDEX_HTML,
    "/app.js" => BundledAsset {
        content_type: "application/javascript; charset=utf-8",
        body: include_bytes!("../../static/app.js"),
    },
    "/style.css" => BundledAsset {
        content_type: "text/css; charset=utf-8",
        body: include_bytes!("../../static/style.css"),
    },
};

static PLACEHOLDER: BundledAsset = BundledAsset {
    content_type: "image/svg+xml",
    body: include_bytes!("../../static/placeholder.svg"),
};

/// Shown when a core asset is neither cached nor reachable.
pub const OFFLINE_PAGE: &str = "<!doctype html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>Offline</h1><p>Only cached images and pages are available.</p></body></html>";

/// Body returned for other requests when the network is down.
pub const OFFLINE_NOTICE: &str = "Offline: only cached images and pages are available.";

pub fn bundled(path: &str) -> Option<&'static BundledAsset> {
    BUNDLED_ASSETS.get(path)
}

/// Last-resort image when neither the image nor the fallback URL can be had.
pub fn placeholder() -> &'static BundledAsset {
    &PLACEHOLDER
}
