use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::aptitude::{AptitudeType, AptitudeVector, APTITUDE_COUNT};
use crate::catalog::{Question, QUESTION_COUNT};
use crate::QuizError;

pub const ANSWER_MIN: u8 = 1;
pub const ANSWER_MAX: u8 = 5;

/// Answers at or above this value contribute the question's interest tags.
const INTEREST_THRESHOLD: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AptitudeScore {
    pub aptitude_type: AptitudeType,
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AptitudeSummary {
    pub average: f64,
    pub top_3: Vec<AptitudeScore>,
    pub bottom_3: Vec<AptitudeScore>,
    pub all: Vec<AptitudeScore>,
}

/// Turn raw submitted answers into a complete, range-checked answer set.
///
/// # Errors
/// Returns [`QuizError::Validation`] when the set is not exactly
/// [`QUESTION_COUNT`] long, or any position is missing or outside `[1, 5]`.
pub fn validate_answers(raw: &[Option<i64>]) -> Result<Vec<u8>, QuizError> {
    if raw.len() != QUESTION_COUNT {
        return Err(QuizError::Validation(format!(
            "answers MUST contain exactly {QUESTION_COUNT} entries (found {})",
            raw.len()
        )));
    }

    raw.iter()
        .enumerate()
        .map(|(index, answer)| {
            let position = index + 1;
            let Some(value) = answer else {
                return Err(QuizError::Validation(format!("answer {position} is missing")));
            };
            u8::try_from(*value)
                .ok()
                .filter(|value| (ANSWER_MIN..=ANSWER_MAX).contains(value))
                .ok_or_else(|| {
                    QuizError::Validation(format!(
                        "answer {position} MUST be in [{ANSWER_MIN}, {ANSWER_MAX}] (found {value})"
                    ))
                })
        })
        .collect()
}

/// Reverse-scored items are inverted around the scale midpoint.
#[must_use]
pub fn adjust_answer(answer: u8, is_reverse: bool) -> u8 {
    if is_reverse {
        (ANSWER_MAX + ANSWER_MIN) - answer
    } else {
        answer
    }
}

/// Score a complete answer set into a per-aptitude mean vector.
///
/// Answers are aligned to questions by ascending `order`, regardless of the
/// order of the `questions` slice.
///
/// # Errors
/// Returns [`QuizError::Validation`] when lengths differ from
/// [`QUESTION_COUNT`], an answer is out of range, or an aptitude type has no
/// questions.
pub fn score(answers: &[u8], questions: &[Question]) -> Result<AptitudeVector, QuizError> {
    if answers.len() != QUESTION_COUNT || questions.len() != QUESTION_COUNT {
        return Err(QuizError::Validation(format!(
            "scoring requires {QUESTION_COUNT} answers and {QUESTION_COUNT} questions \
             (found {} answers, {} questions)",
            answers.len(),
            questions.len()
        )));
    }

    let mut sums = [0_u32; APTITUDE_COUNT];
    let mut counts = [0_u32; APTITUDE_COUNT];
    for (index, (question, answer)) in ordered(questions).into_iter().zip(answers).enumerate() {
        if !(ANSWER_MIN..=ANSWER_MAX).contains(answer) {
            return Err(QuizError::Validation(format!(
                "answer {} MUST be in [{ANSWER_MIN}, {ANSWER_MAX}] (found {answer})",
                index + 1
            )));
        }
        let slot = question.aptitude_type.index();
        sums[slot] += u32::from(adjust_answer(*answer, question.is_reverse));
        counts[slot] += 1;
    }

    let mut values = [0.0_f64; APTITUDE_COUNT];
    for aptitude in AptitudeType::ALL {
        let slot = aptitude.index();
        if counts[slot] == 0 {
            return Err(QuizError::Validation(format!("aptitude {aptitude} has no questions")));
        }
        values[slot] = f64::from(sums[slot]) / f64::from(counts[slot]);
    }

    Ok(AptitudeVector::new(values))
}

/// Interest tags of questions the user agreed with, first occurrence wins.
#[must_use]
pub fn interest_tags(answers: &[u8], questions: &[Question]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for (question, answer) in ordered(questions).into_iter().zip(answers) {
        if *answer < INTEREST_THRESHOLD {
            continue;
        }
        for tag in &question.tags {
            if seen.insert(tag.as_str()) {
                tags.push(tag.clone());
            }
        }
    }
    tags
}

#[must_use]
pub fn aptitude_summary(vector: &AptitudeVector) -> AptitudeSummary {
    let entry = |(aptitude_type, score): (AptitudeType, f64)| AptitudeScore {
        aptitude_type,
        name: aptitude_type.display_name().to_string(),
        score,
    };

    let ranked = vector.ranked();
    let total: f64 = vector.values().iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let average = round_to(total / APTITUDE_COUNT as f64, 2);

    AptitudeSummary {
        average,
        top_3: ranked.iter().take(3).copied().map(entry).collect(),
        bottom_3: ranked.iter().skip(APTITUDE_COUNT - 3).copied().map(entry).collect(),
        all: vector.iter().map(entry).collect(),
    }
}

fn ordered(questions: &[Question]) -> Vec<&Question> {
    let mut ordered = questions.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|question| question.order);
    ordered
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn fixture_questions(reverse: bool) -> Vec<Question> {
        (0..QUESTION_COUNT)
            .map(|index| {
                let order = u8::try_from(index + 1).unwrap_or_else(|_| unreachable!());
                Question {
                    id: u32::from(order),
                    text: format!("question {order}"),
                    aptitude_type: AptitudeType::ALL[index / 2],
                    is_reverse: reverse && index % 2 == 1,
                    order,
                    tags: if index % 2 == 0 { vec![format!("tag-{}", index / 2)] } else { vec![] },
                }
            })
            .collect()
    }

    fn scored(answers: &[u8], questions: &[Question]) -> AptitudeVector {
        match score(answers, questions) {
            Ok(vector) => vector,
            Err(err) => panic!("scoring should succeed: {err}"),
        }
    }

    #[test]
    fn reverse_adjustment_mirrors_around_midpoint() {
        assert_eq!(adjust_answer(5, true), 1);
        assert_eq!(adjust_answer(1, true), 5);
        assert_eq!(adjust_answer(3, true), 3);
        assert_eq!(adjust_answer(4, false), 4);
    }

    #[test]
    fn all_fives_without_reverse_items_score_five_everywhere() {
        let vector = scored(&[5; QUESTION_COUNT], &fixture_questions(false));
        assert_eq!(vector, AptitudeVector::uniform(5.0));
    }

    #[test]
    fn alternating_answers_against_reverse_pairs_hit_the_midpoint() {
        let answers = (0..QUESTION_COUNT).map(|i| if i % 2 == 0 { 1 } else { 5 }).collect::<Vec<_>>();
        let vector = scored(&answers, &fixture_questions(true));
        // 1 on the forward item, 6 - 5 = 1 on the reverse item
        assert_eq!(vector, AptitudeVector::uniform(1.0));

        // 1 forward and 6 - 1 = 5 reverse
        let vector = scored(&[1; QUESTION_COUNT], &fixture_questions(true));
        assert_eq!(vector, AptitudeVector::uniform(3.0));
    }

    #[test]
    fn mean_of_pair_is_reported_per_aptitude() {
        let mut answers = [3_u8; QUESTION_COUNT];
        answers[0] = 5;
        answers[1] = 2;
        let vector = scored(&answers, &fixture_questions(true));
        // (5 + (6 - 2)) / 2
        assert!((vector.get(AptitudeType::Verbal) - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn scoring_aligns_answers_by_question_order() {
        let questions = fixture_questions(true);
        let mut shuffled = questions.clone();
        shuffled.reverse();
        let answers = (0..QUESTION_COUNT)
            .map(|i| u8::try_from(i % 5 + 1).unwrap_or_else(|_| unreachable!()))
            .collect::<Vec<_>>();
        assert_eq!(scored(&answers, &questions), scored(&answers, &shuffled));
    }

    #[test]
    fn validate_rejects_missing_answer_with_position() {
        let mut raw = vec![Some(3_i64); QUESTION_COUNT];
        raw[6] = None;
        assert_eq!(
            validate_answers(&raw),
            Err(QuizError::Validation("answer 7 is missing".to_string()))
        );
    }

    #[test]
    fn validate_rejects_out_of_range_and_short_sets() {
        let mut raw = vec![Some(3_i64); QUESTION_COUNT];
        raw[0] = Some(6);
        assert!(matches!(validate_answers(&raw), Err(QuizError::Validation(_))));
        raw[0] = Some(0);
        assert!(matches!(validate_answers(&raw), Err(QuizError::Validation(_))));
        raw[0] = Some(-300);
        assert!(matches!(validate_answers(&raw), Err(QuizError::Validation(_))));
        assert!(matches!(
            validate_answers(&[Some(3); QUESTION_COUNT - 1]),
            Err(QuizError::Validation(_))
        ));
    }

    #[test]
    fn score_rejects_out_of_range_answers() {
        let mut answers = [3_u8; QUESTION_COUNT];
        answers[19] = 9;
        assert!(matches!(
            score(&answers, &fixture_questions(false)),
            Err(QuizError::Validation(message)) if message.contains("answer 20")
        ));
    }

    #[test]
    fn interest_tags_come_from_agreed_questions_only() {
        let mut answers = [2_u8; QUESTION_COUNT];
        answers[0] = 5;
        answers[4] = 4;
        answers[1] = 5;
        let tags = interest_tags(&answers, &fixture_questions(true));
        assert_eq!(tags, vec!["tag-0".to_string(), "tag-2".to_string()]);
    }

    #[test]
    fn summary_reports_average_and_extremes() {
        let vector = AptitudeVector::new([4.5, 5.0, 4.0, 2.5, 3.0, 2.0, 2.5, 4.5, 4.5, 5.0]);
        let summary = aptitude_summary(&vector);
        assert!((summary.average - 3.75).abs() < f64::EPSILON);
        assert_eq!(summary.top_3[0].aptitude_type, AptitudeType::Logical);
        assert_eq!(summary.top_3[1].aptitude_type, AptitudeType::ProblemSolving);
        assert_eq!(summary.bottom_3.last().map(|entry| entry.aptitude_type), Some(AptitudeType::Physical));
        assert_eq!(summary.all.len(), APTITUDE_COUNT);
    }

    proptest! {
        #[test]
        fn property_scores_stay_within_likert_range(
            answers in prop::collection::vec(1_u8..=5, QUESTION_COUNT),
            reverse in any::<bool>(),
        ) {
            let vector = score(&answers, &fixture_questions(reverse));
            prop_assert!(vector.is_ok());
            let vector = vector.unwrap_or_else(|_| unreachable!());
            prop_assert_eq!(vector.values().len(), APTITUDE_COUNT);
            for value in vector.values() {
                prop_assert!((1.0..=5.0).contains(value));
            }
        }
    }
}
