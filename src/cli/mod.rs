// CLI module for repo-gallery
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use std::path::PathBuf;

/// repo-gallery - offline-first photo gallery for images hosted in a repository
#[derive(Parser, Debug)]
#[command(name = "repo-gallery", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to ~/.repo-gallery/config.toml)
    #[arg(long, short = 'c', env = "REPO_GALLERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the repository's image URLs and exit
    #[arg(long)]
    pub list: bool,

    /// Cache the next N images (1-500) starting at --start, then exit
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=500))]
    pub prefetch: Option<u32>,

    /// Index to start prefetching from
    #[arg(long, default_value_t = 0, requires = "prefetch")]
    pub start: usize,

    /// Print the image cache size and exit
    #[arg(long)]
    pub cache_size: bool,

    /// Delete every cached image (the page shell stays cached) and exit
    #[arg(long)]
    pub clear_images: bool,
}

impl Args {
    /// True when a one-shot action was requested instead of serving.
    pub fn is_one_shot(&self) -> bool {
        self.list || self.prefetch.is_some() || self.cache_size || self.clear_images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefetch_bounds() {
        assert!(Args::try_parse_from(["repo-gallery", "--prefetch", "0"]).is_err());
        assert!(Args::try_parse_from(["repo-gallery", "--prefetch", "501"]).is_err());
        let args = Args::try_parse_from(["repo-gallery", "--prefetch", "500", "--start", "3"]).unwrap();
        assert_eq!(args.prefetch, Some(500));
        assert_eq!(args.start, 3);
        assert!(args.is_one_shot());
    }

    #[test]
    fn test_serve_by_default() {
        let args = Args::try_parse_from(["repo-gallery"]).unwrap();
        assert!(!args.is_one_shot());
        assert!(args.config.is_none());
    }
}
