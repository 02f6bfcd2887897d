//! Property-based tests for image ranking.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::image::Image;
use crate::selector::{images_to_api_images, NewestBuildSelector, SemverSelector, SemverTag};
use crate::version::parse_version;

fn image_strategy() -> impl Strategy<Value = Image> {
    (
        "[a-z0-9.-]{1,12}",
        "[a-f0-9]{64}",
        proptest::option::of(0i64..5),
    )
        .prop_map(|(tag, hex, day)| Image {
            tag,
            digest: format!("sha256:{hex}"),
            created_at: day.and_then(timestamp),
            ..Image::default()
        })
}

fn timestamp(day: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).single()
}

fn permuted_images() -> impl Strategy<Value = (Vec<Image>, Vec<Image>)> {
    prop::collection::vec(image_strategy(), 1..20)
        .prop_flat_map(|images| (Just(images.clone()), Just(images).prop_shuffle()))
}

fn tags(images: &[Image]) -> Vec<(Option<DateTime<Utc>>, String)> {
    images
        .iter()
        .map(|i| (i.created_at, i.tag.clone()))
        .collect()
}

proptest! {
    #[test]
    fn images_to_api_images_respects_limit(
        images in prop::collection::vec(image_strategy(), 0..30),
        limit in 0usize..40,
    ) {
        let refs = images_to_api_images(&images, limit);
        let expected = if limit == 0 { images.len() } else { limit.min(images.len()) };
        prop_assert_eq!(refs.len(), expected);
        for (reference, image) in refs.iter().zip(&images) {
            prop_assert_eq!(&reference.tag, &image.tag);
            prop_assert_eq!(&reference.digest, &image.digest);
        }
    }

    #[test]
    fn newest_build_sort_is_permutation_independent((mut sorted, mut shuffled) in permuted_images()) {
        NewestBuildSelector::sort(&mut sorted);
        NewestBuildSelector::sort(&mut shuffled);
        prop_assert_eq!(tags(&sorted), tags(&shuffled));

        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.created_at >= b.created_at);
            if a.created_at == b.created_at {
                prop_assert!(a.tag >= b.tag);
            }
        }
    }

    #[test]
    fn semver_sort_is_descending(
        versions in prop::collection::vec((0u64..4, 0u64..4, 0u64..4, any::<bool>()), 1..20),
    ) {
        let mut tags: Vec<SemverTag> = versions
            .iter()
            .filter_map(|(major, minor, patch, prefixed)| {
                let tag = if *prefixed {
                    format!("v{major}.{minor}.{patch}")
                } else {
                    format!("{major}.{minor}.{patch}")
                };
                let version = parse_version(&tag, true)?;
                Some(SemverTag { tag, version })
            })
            .collect();
        SemverSelector::sort(&mut tags);

        for pair in tags.windows(2) {
            let ordering = pair[0].version.cmp_precedence(&pair[1].version);
            prop_assert!(ordering.is_ge());
            if ordering.is_eq() {
                prop_assert!(pair[0].tag >= pair[1].tag);
            }
        }
    }
}
