use piepho::{
    assign_letters, letters, Comparison, Comparisons, Error, LetterConfig, LetterMatrix, Letters,
    Members, Metric,
};
use std::collections::HashMap;

fn all_pairs(groups: &[&'static str], reject: bool) -> Comparisons<&'static str> {
    let mut comparisons = Comparisons::new();
    for (i, &a) in groups.iter().enumerate() {
        for &b in &groups[i + 1..] {
            comparisons.add(a, b, reject).unwrap();
        }
    }
    comparisons
}

fn seeded() -> LetterConfig {
    LetterConfig::default().with_seed(20040101)
}

#[test]
fn two_alike_one_apart() {
    let comparisons = Comparisons::from_records(vec![
        Comparison {
            group1: "A",
            group2: "B",
            reject: false,
        },
        Comparison {
            group1: "A",
            group2: "C",
            reject: true,
        },
        Comparison {
            group1: "B",
            group2: "C",
            reject: true,
        },
    ])
    .unwrap();

    let letters = assign_letters(&comparisons, None, &seeded()).unwrap();
    assert_eq!(letters.classes(), 2);
    let a = letters.get(&"A").unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(letters.get(&"B"), Some(a));
    assert_ne!(letters.get(&"C"), Some(a));
    assert_eq!(letters.get(&"C").unwrap().len(), 1);
}

#[test]
fn all_different() {
    let groups = ["w", "x", "y", "z"];
    let letters = assign_letters(&all_pairs(&groups, true), None, &seeded()).unwrap();
    assert_eq!(letters.classes(), 4);

    let mut seen: Vec<&str> = groups.iter().map(|g| letters.get(g).unwrap()).collect();
    assert!(seen.iter().all(|s| s.len() == 1));
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 4);
}

#[test]
fn all_alike() {
    let groups = ["w", "x", "y", "z"];
    let letters = assign_letters(&all_pairs(&groups, false), None, &seeded()).unwrap();
    assert_eq!(letters.classes(), 1);
    for group in &groups {
        assert_eq!(letters.get(group), Some("a"));
    }
}

#[test]
fn missing_pair_is_malformed() {
    let mut comparisons = Comparisons::new();
    comparisons
        .add("a", "b", true)
        .unwrap()
        .add("a", "c", false)
        .unwrap();
    assert_eq!(comparisons.missing_pair(), Some((1, 2)));
    assert!(matches!(
        comparisons.require_complete(),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn incomplete_comparisons_still_get_letters() {
    // b and c were never compared, so whether they share a letter is unconstrained.
    let mut comparisons = Comparisons::new();
    comparisons
        .add("a", "b", true)
        .unwrap()
        .add("a", "c", false)
        .unwrap();
    let letters = assign_letters(&comparisons, None, &seeded()).unwrap();
    assert_eq!(letters.share_letter(&"a", &"b"), Some(false));
    assert_eq!(letters.share_letter(&"a", &"c"), Some(true));
}

#[test]
fn chain_of_overlaps() {
    // Each group is indistinguishable only from its neighbours, which needs one letter per
    // adjacent pair.
    let groups = ["g0", "g1", "g2", "g3", "g4"];
    let mut comparisons = Comparisons::new();
    for (i, &a) in groups.iter().enumerate() {
        for (j, &b) in groups.iter().enumerate().skip(i + 1) {
            comparisons.add(a, b, j - i > 1).unwrap();
        }
    }

    let letters = assign_letters(&comparisons, None, &seeded()).unwrap();
    assert_eq!(letters.classes(), 4);
    assert_eq!(letters.fitness().max_per_group, 2);
    assert_eq!(letters.fitness().total, 8);
    assert_eq!(letters.get(&"g0").unwrap().len(), 1);
    assert_eq!(letters.get(&"g2").unwrap().len(), 2);
}

#[test]
fn separator_between_letters() {
    let mut comparisons = Comparisons::new();
    comparisons
        .add("a", "b", false)
        .unwrap()
        .add("a", "c", true)
        .unwrap()
        .add("b", "c", false)
        .unwrap();
    let config = seeded().with_separator("-");
    let letters = assign_letters(&comparisons, None, &config).unwrap();
    assert_eq!(letters.get(&"b"), Some("a-b"));
    assert_eq!(letters.letters_of(&"b"), Some(&['a', 'b'][..]));
}

#[test]
fn medians_order_the_letters() {
    let mut comparisons = Comparisons::new();
    comparisons
        .add("low", "mid", false)
        .unwrap()
        .add("low", "high", true)
        .unwrap()
        .add("mid", "high", false)
        .unwrap();

    let medians: HashMap<_, _> = vec![("low", 1.0), ("mid", 5.0), ("high", 10.0)]
        .into_iter()
        .collect();
    let letters = assign_letters(&comparisons, Some(&medians), &seeded()).unwrap();
    assert_eq!(letters.get(&"high"), Some("a"));
    assert_eq!(letters.get(&"mid"), Some("ab"));
    assert_eq!(letters.get(&"low"), Some("b"));

    let reversed: HashMap<_, _> = medians.iter().map(|(&g, &m)| (g, -m)).collect();
    let letters = assign_letters(&comparisons, Some(&reversed), &seeded()).unwrap();
    assert_eq!(letters.get(&"high"), Some("b"));
    assert_eq!(letters.get(&"low"), Some("a"));
}

#[test]
fn too_many_classes() {
    let groups: Vec<&'static str> = vec![
        "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "14", "15",
        "16", "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27",
    ];
    let comparisons = all_pairs(&groups, true);

    assert_eq!(
        assign_letters(&comparisons, None, &seeded()).unwrap_err(),
        Error::TooManyClasses {
            classes: 27,
            available: 26
        }
    );

    let extended = seeded().with_glyphs(letters::extended_glyphs());
    let letters = assign_letters(&comparisons, None, &extended).unwrap();
    assert_eq!(letters.classes(), 27);
    let mut seen: Vec<&str> = letters.iter().map(|(_, s)| s).collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 27);
    assert!(seen.contains(&"A"));
}

fn members(groups: usize, rows: &[usize]) -> Members {
    let mut members = Members::empty(groups);
    for &row in rows {
        members.insert(row);
    }
    members
}

#[test]
fn insert_splits_first_group_out_of_original() {
    let mut comparisons = Comparisons::new();
    comparisons.add("A", "B", true).unwrap();
    let matrix = LetterMatrix::insert(&comparisons);
    assert_eq!(matrix.classes(), &[members(2, &[1]), members(2, &[0])][..]);
}

#[test]
fn absorb_after_plain_insert() {
    let mut comparisons = Comparisons::new();
    comparisons
        .add("A", "B", false)
        .unwrap()
        .add("A", "C", true)
        .unwrap()
        .add("B", "C", true)
        .unwrap();

    let mut matrix = LetterMatrix::insert(&comparisons);
    assert_eq!(
        matrix.classes(),
        &[members(3, &[2]), members(3, &[0, 1]), members(3, &[1])][..]
    );
    assert!(matrix.is_valid(&comparisons));

    assert_eq!(matrix.absorb(), 1);
    assert_eq!(matrix.classes(), &[members(3, &[2]), members(3, &[0, 1])][..]);
    assert!(matrix.is_valid(&comparisons));
    assert_eq!(matrix, LetterMatrix::insert_absorbing(&comparisons));
}

#[test]
fn parses_metric_names() {
    assert_eq!("classes-count".parse::<Metric>().unwrap(), Metric::Classes);
    assert_eq!("max-per-row".parse::<Metric>().unwrap(), Metric::MaxPerGroup);
    assert_eq!("letter-total".parse::<Metric>().unwrap(), Metric::Total);
    assert_eq!("classes".parse::<Metric>().unwrap(), Metric::Classes);
    assert_eq!("max-per-group".parse::<Metric>().unwrap(), Metric::MaxPerGroup);
    assert_eq!("total".parse::<Metric>().unwrap(), Metric::Total);
    assert!(matches!(
        "fewest".parse::<Metric>(),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn zero_cycles_is_malformed() {
    let comparisons = all_pairs(&["a", "b"], true);
    assert!(matches!(
        assign_letters(&comparisons, None, &seeded().with_cycles(0)),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn no_groups() {
    let comparisons: Comparisons<u32> = Comparisons::new();
    let letters = assign_letters(&comparisons, None, &seeded()).unwrap();
    assert!(letters.is_empty());
    assert_eq!(letters.classes(), 0);
}

#[test]
fn mismatched_labels_are_an_internal_error() {
    let matrix = LetterMatrix::from_classes(2, vec![Members::full(2)]);
    assert!(matches!(
        Letters::new(&matrix, &["only one"], None, "", &letters::default_glyphs()),
        Err(Error::InfeasibleRepresentation(_))
    ));
}

#[test]
fn matrix_input() {
    let nan = f64::NAN;
    let labels = ["a", "b", "c"];
    let p = [
        [nan, 0.50, 0.01],
        [0.50, nan, 0.20],
        [0.01, 0.20, nan],
    ];
    let comparisons = Comparisons::from_matrix(&labels, &p, 0.05).unwrap();
    comparisons.require_complete().unwrap();
    let decisions: Vec<_> = comparisons
        .iter()
        .map(|c| (*c.group1, *c.group2, c.reject))
        .collect();
    assert_eq!(
        decisions,
        vec![("a", "b", false), ("a", "c", true), ("b", "c", false)]
    );

    let disagreeing = [[nan, 0.01], [0.5, nan]];
    assert!(matches!(
        Comparisons::from_matrix(&["a", "b"], &disagreeing, 0.05),
        Err(Error::MalformedInput(_))
    ));

    let ragged: [&[f64]; 2] = [&[nan, 0.01], &[0.01]];
    assert!(matches!(
        Comparisons::from_matrix(&["a", "b"], &ragged, 0.05),
        Err(Error::MalformedInput(_))
    ));

    let missing = [[nan, nan], [nan, nan]];
    let comparisons = Comparisons::from_matrix(&["a", "b"], &missing, 0.05).unwrap();
    assert_eq!(comparisons.groups().len(), 2);
    assert!(comparisons.require_complete().is_err());
}

#[test]
fn time_limit_keeps_first_trial() {
    let groups = ["a", "b", "c", "d"];
    let comparisons = all_pairs(&groups, false);
    let mut baseline = LetterMatrix::insert(&comparisons);
    baseline.absorb();

    let config = seeded()
        .with_cycles(50)
        .with_time_limit(std::time::Duration::from_secs(0));
    let best = piepho::sweep::monte_carlo(&baseline, &comparisons, &config).unwrap();
    assert_eq!(best.completed, 1);
    assert_eq!(best.index, 0);
    assert!(best.matrix.is_valid(&comparisons));
}

#[cfg(feature = "serde")]
#[test]
fn serde_round_trip() {
    use piepho::PostHoc;

    let comparison = Comparison {
        group1: "a".to_string(),
        group2: "b".to_string(),
        reject: true,
    };
    let json = serde_json::to_string(&comparison).unwrap();
    assert_eq!(json, r#"{"group1":"a","group2":"b","reject":true}"#);
    assert_eq!(
        serde_json::from_str::<Comparison<String>>(&json).unwrap(),
        comparison
    );

    assert_eq!(serde_json::to_string(&Metric::Total).unwrap(), r#""Total""#);
    assert_eq!(
        serde_json::from_str::<PostHoc>(r#""Dunn""#).unwrap(),
        PostHoc::Dunn
    );
}
