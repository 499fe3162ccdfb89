use rand::seq::SliceRandom;
use rand::Rng;

/// Draws the question set for one attempt and fixes its presentation order.
///
/// The effective sample size is `min(bank, sample_size)`; a sample size of
/// zero (or an oversized one) means the whole bank. Selection and
/// presentation order are randomized independently: `choose_multiple` does
/// not promise a random order, so the drawn subset is shuffled again.
///
/// Pure over its snapshot of the bank; the randomness source is injected so
/// callers control determinism.
pub(crate) fn select_and_order<R: Rng + ?Sized>(
    bank: &[String],
    sample_size: i32,
    rng: &mut R,
) -> Vec<String> {
    let effective = if sample_size <= 0 {
        bank.len()
    } else {
        bank.len().min(sample_size as usize)
    };

    let mut drawn: Vec<String> = bank.choose_multiple(rng, effective).cloned().collect();
    drawn.shuffle(rng);
    drawn
}
