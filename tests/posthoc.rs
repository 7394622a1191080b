use piepho::posthoc::{holm, studentized_range_cdf};
use piepho::{assign_letters, Error, LetterConfig, PostHoc, Samples};

fn samples(groups: &[(&'static str, &[f64])]) -> Samples<&'static str> {
    let mut samples = Samples::new();
    for &(group, values) in groups {
        for &value in values {
            samples.add(group, value).unwrap();
        }
    }
    samples
}

fn close(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() < tolerance
}

#[test]
fn studentized_range_table_values() {
    // Upper 5% points from published tables of the studentized range.
    assert!(close(studentized_range_cdf(3.773, 3, 12.0), 0.95, 1e-3));
    assert!(close(studentized_range_cdf(4.34, 3, 6.0), 0.95, 1e-3));
    // Infinite degrees of freedom: the range of two standard normals.
    assert!(close(studentized_range_cdf(1.96 * 2f64.sqrt(), 2, 1e6), 0.95, 1e-3));
}

#[test]
fn studentized_range_edges() {
    assert_eq!(studentized_range_cdf(0.0, 3, 10.0), 0.0);
    assert_eq!(studentized_range_cdf(-1.0, 3, 10.0), 0.0);
    assert_eq!(studentized_range_cdf(f64::INFINITY, 3, 10.0), 1.0);
    assert!(studentized_range_cdf(1.0, 1, 10.0).is_nan());
    assert!(studentized_range_cdf(1.0, 3, 1.0).is_nan());

    // More degrees of freedom means a tighter distribution.
    let mut last = 0.0;
    for df in [5.0, 20.0, 200.0, 1000.0, 10000.0, 30000.0] {
        let p = studentized_range_cdf(3.5, 4, df);
        assert!(p > last);
        last = p;
    }
}

#[test]
fn tukey_p_values() {
    let samples = samples(&[
        ("a", &[1.0, 2.0, 3.0]),
        ("b", &[4.0, 5.0, 6.0]),
        ("c", &[7.0, 8.0, 9.0]),
    ]);
    let results = PostHoc::Tukey.pairwise(&samples).unwrap();
    let pairs: Vec<_> = results.iter().map(|r| (r.group1, r.group2)).collect();
    assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);

    assert!(close(results[0].statistic, 27f64.sqrt(), 1e-9));
    assert!(close(results[0].p_value, 0.024229, 1e-4));
    assert!(close(results[1].p_value, 0.000794, 1e-4));
    assert!(close(results[2].p_value, results[0].p_value, 1e-12));
}

#[test]
fn tukey_without_spread() {
    let samples = samples(&[("a", &[1.0, 1.0]), ("b", &[1.0, 1.0]), ("c", &[2.0, 2.0])]);
    let results = PostHoc::Tukey.pairwise(&samples).unwrap();
    assert_eq!(results[0].p_value, 1.0);
    assert_eq!(results[1].p_value, 0.0);
}

#[test]
fn tukey_needs_residual_degrees_of_freedom() {
    let samples = samples(&[("a", &[1.0, 2.0]), ("b", &[3.0])]);
    assert!(matches!(
        PostHoc::Tukey.pairwise(&samples),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn one_group_is_malformed() {
    let samples = samples(&[("a", &[1.0, 2.0, 3.0])]);
    assert!(matches!(
        PostHoc::Dunn.pairwise(&samples),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn dunn_p_values() {
    let two = samples(&[("a", &[1.0, 2.0, 3.0]), ("b", &[4.0, 5.0, 6.0])]);
    let results = PostHoc::Dunn.pairwise(&two).unwrap();
    assert!(close(results[0].statistic, 1.963961, 1e-5));
    assert!(close(results[0].p_value, 0.049535, 1e-5));

    // Ties get average ranks, and three comparisons are Holm-adjusted.
    let three = samples(&[
        ("a", &[1.0, 2.0, 2.0, 3.0]),
        ("b", &[2.0, 5.0, 6.0, 7.0]),
        ("c", &[8.0, 9.0, 9.0, 10.0]),
    ]);
    let results = PostHoc::Dunn.pairwise(&three).unwrap();
    let expected = [
        (1.187119, 0.235180),
        (2.967799, 0.008998),
        (1.780679, 0.149930),
    ];
    for (result, &(z, p)) in results.iter().zip(&expected) {
        assert!(close(result.statistic, z, 1e-5));
        assert!(close(result.p_value, p, 1e-5));
    }
}

#[test]
fn dunn_with_everything_tied() {
    let samples = samples(&[("a", &[4.0, 4.0]), ("b", &[4.0, 4.0])]);
    let results = PostHoc::Dunn.pairwise(&samples).unwrap();
    assert_eq!(results[0].statistic, 0.0);
    assert_eq!(results[0].p_value, 1.0);
}

#[test]
fn holm_is_monotone_and_capped() {
    assert_eq!(holm(&[]), Vec::<f64>::new());
    assert_eq!(holm(&[0.5, 0.9]), vec![1.0, 1.0]);
    assert_eq!(holm(&[0.02, 0.01]), vec![0.02, 0.02]);
}

#[test]
fn samples_reject_non_finite_values() {
    let mut samples = Samples::new();
    assert!(samples.add("a", f64::NAN).is_err());
    assert!(samples.add("a", f64::INFINITY).is_err());
    assert!(samples.is_empty());
}

#[test]
fn parses_test_names() {
    assert_eq!("tukey".parse::<PostHoc>().unwrap(), PostHoc::Tukey);
    assert_eq!("dunn".parse::<PostHoc>().unwrap(), PostHoc::Dunn);
    assert!("anova".parse::<PostHoc>().is_err());
}

#[test]
fn observations_to_letters() {
    let samples = samples(&[
        ("placebo", &[5.1, 4.9, 5.3, 5.0, 5.2]),
        ("low", &[5.4, 5.6, 5.2, 5.5, 5.3]),
        ("high", &[7.9, 8.1, 8.0, 7.8, 8.2]),
    ]);
    let comparisons = PostHoc::Tukey.compare(&samples, 0.05).unwrap();
    comparisons.require_complete().unwrap();

    let medians = samples.medians();
    assert_eq!(medians[&"high"], 8.0);

    let config = LetterConfig::default().with_seed(1);
    let letters = assign_letters(&comparisons, Some(&medians), &config).unwrap();
    assert_eq!(letters.get(&"high"), Some("a"));
    assert_eq!(letters.share_letter(&"placebo", &"high"), Some(false));
    assert_eq!(letters.share_letter(&"low", &"high"), Some(false));
}
