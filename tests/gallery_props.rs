// Property tests for gallery navigation
// Author: kelexine (https://github.com/kelexine)

use proptest::prelude::*;
use repo_gallery::gallery::{GalleryState, Navigation};

fn gallery(len: usize) -> GalleryState {
    GalleryState::new((0..len).map(|i| format!("https://raw.example.com/{}.jpg", i)).collect())
        .unwrap()
}

#[derive(Debug, Clone)]
enum Step {
    Next,
    Prev,
    GoTo(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Next),
        Just(Step::Prev),
        (0usize..40).prop_map(Step::GoTo),
    ]
}

proptest! {
    #[test]
    fn index_always_in_bounds(len in 1usize..30, steps in prop::collection::vec(step(), 0..60)) {
        let mut state = gallery(len);
        for step in steps {
            let before = state.current_index();
            match step {
                Step::Next => {
                    let moved = matches!(state.next(), Navigation::Moved(_));
                    prop_assert_eq!(moved, before + 1 < len);
                }
                Step::Prev => {
                    let moved = matches!(state.prev(), Navigation::Moved(_));
                    prop_assert_eq!(moved, before > 0);
                }
                Step::GoTo(index) => {
                    let ok = state.go_to(index).is_ok();
                    prop_assert_eq!(ok, index < len);
                    if !ok {
                        prop_assert_eq!(state.current_index(), before);
                    }
                }
            }
            prop_assert!(state.current_index() < len);
        }
    }

    #[test]
    fn next_at_end_is_idempotent(len in 1usize..30, extra in 1usize..5) {
        let mut state = gallery(len);
        state.go_to(len - 1).unwrap();
        for _ in 0..extra {
            prop_assert_eq!(state.next(), Navigation::Unchanged);
        }
        prop_assert_eq!(state.current_index(), len - 1);
        prop_assert_eq!(state.page_info(), format!("{}/{}", len, len));
    }

    #[test]
    fn window_never_repeats(len in 1usize..30, start_seed in 0usize..30, count in 1usize..600) {
        let state = gallery(len);
        let start = start_seed % len;
        let window = state.window(start, count).unwrap();
        prop_assert_eq!(window.len(), count.min(len));
        let mut unique = window.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), window.len());
    }
}
