//! In-place content shuffling of output files
//!
//! File names and directories stay where they are; only the audio behind
//! them is permuted. Each position is exchanged with a randomly drawn
//! partner, and positions that draw themselves are left unchanged, so the
//! result is close to but not guaranteed to be a derangement.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{MixError, MixResult};

/// Outcome of shuffling one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShuffleReport {
    pub swapped: usize,
    pub skipped: usize,
}

/// Files of one machine directory that are shuffled among themselves
#[derive(Debug, Clone)]
pub struct ShuffleGroup {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// True for names like `section_00_source_1_normal_0042.wav`
pub fn is_normal_output(name: &str) -> bool {
    static NORMAL_RE: OnceLock<Regex> = OnceLock::new();
    let re = NORMAL_RE.get_or_init(|| Regex::new(r"^section_.*_source_.*_normal.*\.wav$").expect("static regex"));
    re.is_match(name)
}

/// Collect the "normal" outputs of every machine directory under `dest_root`.
///
/// Files are looked up two levels below each machine directory
/// (`<machine>/<split>/<file>`) and sorted by path.
pub fn collect_normal_groups(dest_root: &Path) -> MixResult<Vec<ShuffleGroup>> {
    let mut machines: Vec<PathBuf> = fs::read_dir(dest_root)
        .map_err(|e| MixError::io(dest_root, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    machines.sort();

    let mut groups = Vec::new();
    for dir in machines {
        let mut files: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_str().is_some_and(is_normal_output))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        log::debug!("collect_normal_groups: {} files in {:?}", files.len(), dir);
        groups.push(ShuffleGroup { dir, files });
    }
    Ok(groups)
}

/// Permute the contents of `files`, keeping every path in place.
///
/// A holding area is created inside `group_dir` so all moves are renames on
/// one filesystem. A failed exchange is rolled back; if the rollback fails
/// too, the holding area is kept and reported in the error.
pub fn shuffle_contents<R: Rng + ?Sized>(
    group_dir: &Path,
    files: &[PathBuf],
    rng: &mut R,
) -> MixResult<ShuffleReport> {
    shuffle_with(group_dir, files, rng, |from, to| fs::rename(from, to))
}

fn shuffle_with<R, F>(group_dir: &Path, files: &[PathBuf], rng: &mut R, mut rename: F) -> MixResult<ShuffleReport>
where
    R: Rng + ?Sized,
    F: FnMut(&Path, &Path) -> std::io::Result<()>,
{
    let mut report = ShuffleReport::default();
    if files.len() < 2 {
        report.skipped = files.len();
        return Ok(report);
    }

    let mut targets: Vec<&PathBuf> = files.iter().collect();
    targets.shuffle(rng);

    let holding = tempfile::Builder::new()
        .prefix(".shuffle-")
        .tempdir_in(group_dir)
        .map_err(|e| MixError::io(group_dir, e))?;
    let parked = holding.path().join("content");

    for (a, b) in files.iter().zip(targets) {
        if a == b {
            log::debug!("shuffle_contents: {:?} keeps its content", a);
            report.skipped += 1;
            continue;
        }
        if let Err(failure) = exchange(a, b, &parked, &mut rename) {
            return Err(match failure {
                SwapFailure::RolledBack(source) => MixError::Shuffle {
                    a: a.clone(),
                    b: b.clone(),
                    holding: None,
                    source,
                },
                SwapFailure::Stranded(source) => {
                    let kept = holding.keep();
                    log::error!("shuffle_contents: content left in {:?}", kept);
                    MixError::Shuffle {
                        a: a.clone(),
                        b: b.clone(),
                        holding: Some(kept),
                        source,
                    }
                }
            });
        }
        report.swapped += 1;
    }

    log::info!(
        "shuffle_contents: {:?} swapped {} skipped {}",
        group_dir,
        report.swapped,
        report.skipped
    );
    Ok(report)
}

enum SwapFailure {
    RolledBack(std::io::Error),
    Stranded(std::io::Error),
}

/// Swap the contents of `a` and `b` through `parked`
fn exchange<F>(a: &Path, b: &Path, parked: &Path, rename: &mut F) -> Result<(), SwapFailure>
where
    F: FnMut(&Path, &Path) -> std::io::Result<()>,
{
    rename(a, parked).map_err(SwapFailure::RolledBack)?;

    if let Err(e) = rename(b, a) {
        return Err(match rename(parked, a) {
            Ok(()) => SwapFailure::RolledBack(e),
            Err(_) => SwapFailure::Stranded(e),
        });
    }

    if let Err(e) = rename(parked, b) {
        // Undo b -> a, then restore a
        let restored = rename(a, b).and_then(|_| rename(parked, a));
        return Err(match restored {
            Ok(()) => SwapFailure::RolledBack(e),
            Err(_) => SwapFailure::Stranded(e),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("section_00_source_0_normal_{:04}.wav", i + 1));
                fs::write(&path, format!("content-{}", i)).unwrap();
                path
            })
            .collect()
    }

    fn contents(files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|f| fs::read_to_string(f).unwrap()).collect()
    }

    #[test]
    fn test_is_normal_output() {
        assert!(is_normal_output("section_00_source_0_normal_0001.wav"));
        assert!(is_normal_output("section_02_source_1_normal_abc.wav"));
        assert!(!is_normal_output("section_00_source_0_anomaly_0001.wav"));
        assert!(!is_normal_output("section_00_source_0_normal_0001.flac"));
    }

    #[test]
    fn test_shuffle_preserves_multiset_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), 12);
        let before = contents(&files);

        let report = shuffle_contents(dir.path(), &files, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(report.swapped + report.skipped, 12);
        assert!(report.swapped > 0);

        let after = contents(&files);
        let mut sorted_before = before.clone();
        let mut sorted_after = after.clone();
        sorted_before.sort();
        sorted_after.sort();
        assert_eq!(sorted_before, sorted_after);
        assert_ne!(before, after);

        // Same names, holding area removed
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(names.len(), 12);
        assert!(files.iter().all(|f| f.exists()));
    }

    #[test]
    fn test_single_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), 1);
        let report = shuffle_contents(dir.path(), &files, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report, ShuffleReport { swapped: 0, skipped: 1 });
        assert_eq!(contents(&files), vec!["content-0".to_string()]);
    }

    /// Rename that performs the real move except on the listed call numbers
    fn failing_on(calls: &'static [usize]) -> impl FnMut(&Path, &Path) -> std::io::Result<()> {
        let mut count = 0;
        move |from, to| {
            count += 1;
            if calls.contains(&count) {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "injected failure"))
            } else {
                fs::rename(from, to)
            }
        }
    }

    #[test]
    fn test_failed_swap_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), 10);
        let before = contents(&files);

        // Second move of the first exchange fails, the rollback succeeds
        let result = shuffle_with(dir.path(), &files, &mut StdRng::seed_from_u64(5), failing_on(&[2]));
        assert!(matches!(result, Err(MixError::Shuffle { holding: None, .. })));
        assert_eq!(contents(&files), before);

        // Holding area is gone
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 10);
    }

    #[test]
    fn test_failed_rollback_keeps_holding_area() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), 10);
        let before = contents(&files);

        // Both the second move and its rollback fail
        let result = shuffle_with(dir.path(), &files, &mut StdRng::seed_from_u64(5), failing_on(&[2, 3]));
        let holding = match result {
            Err(MixError::Shuffle { holding: Some(holding), .. }) => holding,
            other => panic!("unexpected result: {other:?}"),
        };

        // The parked content survives in the kept holding area
        let parked = fs::read_to_string(holding.join("content")).unwrap();
        assert!(before.contains(&parked));
        let missing: Vec<_> = files.iter().filter(|f| !f.exists()).collect();
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_collect_normal_groups_per_machine() {
        let root = tempfile::tempdir().unwrap();
        let car = root.path().join("ToyCar").join("train");
        let train = root.path().join("ToyTrain").join("test");
        fs::create_dir_all(&car).unwrap();
        fs::create_dir_all(&train).unwrap();
        fixture(&car, 3);
        fixture(&train, 2);
        fs::write(car.join("section_00_source_0_anomaly_0001.wav"), b"x").unwrap();
        fs::write(root.path().join("log.txt"), b"log").unwrap();

        let groups = collect_normal_groups(root.path()).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].dir.ends_with("ToyCar"));
        assert_eq!(groups[0].files.len(), 3);
        assert!(groups[0].files.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(groups[1].files.len(), 2);
    }
}
