use crate::quota::{allocate, AllocationMethod, GenerationConfig, QuotaCounts};
use serde::Serialize;

pub const FALLBACK_TOPIC_TAG: &str = "grammar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    Descriptive,
}

impl QuestionType {
    fn id_prefix(self) -> &'static str {
        match self {
            Self::MultipleChoice => "mc",
            Self::ShortAnswer => "sa",
            Self::Descriptive => "desc",
        }
    }

    fn points(self) -> u32 {
        match self {
            Self::MultipleChoice => 1,
            Self::ShortAnswer => 2,
            Self::Descriptive => 5,
        }
    }

    fn prompt_templates(self) -> &'static [&'static str] {
        match self {
            Self::MultipleChoice => &[
                "Which statement best describes {topic}?",
                "Which example correctly applies {topic}?",
                "Which of the following is true about {topic}?",
            ],
            Self::ShortAnswer => &[
                "In one or two sentences, explain {topic}.",
                "Give one example of {topic} and say why it fits.",
                "Define {topic} in your own words.",
            ],
            Self::Descriptive => &[
                "Describe how {topic} is used, with at least two examples.",
                "Compare two approaches to {topic} and justify which you prefer.",
                "Write a paragraph applying {topic} to a real-world situation.",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    pub is_correct: bool,
}

/// A placeholder question. Every field is expected to be edited before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStub {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_answer: Option<String>,
    pub concept_tags: Vec<String>,
    pub points: u32,
    pub needs_review: bool,
}

fn fill(template: &str, topic: &str) -> String {
    template.replace("{topic}", topic)
}

fn mc_options(topic: &str) -> Vec<QuestionOption> {
    // The first option is always the keyed answer until a reviewer says otherwise.
    [
        format!("A correct statement about {topic}"),
        format!("A common misconception about {topic}"),
        format!("An unrelated claim presented as {topic}"),
        format!("A partially correct statement about {topic}"),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, text)| QuestionOption {
        text,
        is_correct: i == 0,
    })
    .collect()
}

fn stub(question_type: QuestionType, index: usize, topic: &str) -> QuestionStub {
    let templates = question_type.prompt_templates();
    let prompt = fill(templates[index % templates.len()], topic);
    let (options, sample_answer) = match question_type {
        QuestionType::MultipleChoice => (Some(mc_options(topic)), None),
        QuestionType::ShortAnswer => (
            None,
            Some(format!("Sample answer: a brief explanation of {topic}.")),
        ),
        QuestionType::Descriptive => (None, None),
    };
    QuestionStub {
        id: format!("{}-{}", question_type.id_prefix(), index + 1),
        question_type,
        prompt,
        options,
        sample_answer,
        concept_tags: vec![topic.to_string()],
        points: question_type.points(),
        needs_review: true,
    }
}

/// Trimmed, non-blank tags; `fallback` alone when nothing usable was supplied.
pub fn usable_topic_tags(topic_tags: &[String], fallback: &str) -> Vec<String> {
    let tags = topic_tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if tags.is_empty() {
        vec![fallback.to_string()]
    } else {
        tags
    }
}

pub fn stubs_for_counts(counts: &QuotaCounts, topic_tags: &[String]) -> Vec<QuestionStub> {
    let tags = usable_topic_tags(topic_tags, FALLBACK_TOPIC_TAG);
    let mut out = Vec::with_capacity(counts.total() as usize);
    for (question_type, count) in [
        (QuestionType::MultipleChoice, counts.multiple_choice),
        (QuestionType::ShortAnswer, counts.short_answer),
        (QuestionType::Descriptive, counts.descriptive),
    ] {
        for i in 0..count as usize {
            out.push(stub(question_type, i, &tags[i % tags.len()]));
        }
    }
    out
}

/// Deterministic: identical arguments always produce identical stubs.
pub fn generate_with(
    config: &GenerationConfig,
    topic_tags: &[String],
    method: AllocationMethod,
) -> Vec<QuestionStub> {
    stubs_for_counts(&allocate(config, method), topic_tags)
}

pub fn generate(config: &GenerationConfig, topic_tags: &[String]) -> Vec<QuestionStub> {
    generate_with(config, topic_tags, AllocationMethod::IndependentRounding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuestionTypeRatio;

    fn config(n: u32, mc: f64, sa: f64, desc: f64) -> GenerationConfig {
        GenerationConfig {
            target_question_count: n,
            question_type_ratio: QuestionTypeRatio {
                multiple_choice: mc,
                short_answer: sa,
                descriptive: desc,
            },
        }
    }

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn count_of(stubs: &[QuestionStub], t: QuestionType) -> usize {
        stubs.iter().filter(|s| s.question_type == t).count()
    }

    #[test]
    fn seventy_twenty_ten_yields_seven_two_one() {
        let stubs = generate(&config(10, 70.0, 20.0, 10.0), &tags(&["verbs", "nouns"]));
        assert_eq!(stubs.len(), 10);
        assert_eq!(count_of(&stubs, QuestionType::MultipleChoice), 7);
        assert_eq!(count_of(&stubs, QuestionType::ShortAnswer), 2);
        assert_eq!(count_of(&stubs, QuestionType::Descriptive), 1);
        assert_eq!(stubs[0].id, "mc-1");
        assert_eq!(stubs[7].id, "sa-1");
        assert_eq!(stubs[9].id, "desc-1");
    }

    #[test]
    fn tags_and_templates_cycle_by_index() {
        let stubs = generate(&config(4, 100.0, 0.0, 0.0), &tags(&["verbs", "nouns"]));
        let topics = stubs
            .iter()
            .map(|s| s.concept_tags[0].as_str())
            .collect::<Vec<_>>();
        assert_eq!(topics, vec!["verbs", "nouns", "verbs", "nouns"]);
        assert_eq!(stubs[0].prompt, "Which statement best describes verbs?");
        assert_eq!(stubs[3].prompt, "Which statement best describes nouns?");
    }

    #[test]
    fn multiple_choice_has_four_options_first_correct() {
        let stubs = generate(&config(3, 34.0, 33.0, 33.0), &tags(&["fractions"]));
        let mc = &stubs[0];
        let options = mc.options.as_ref().expect("mc options");
        assert_eq!(options.len(), 4);
        assert!(options[0].is_correct);
        assert!(options[1..].iter().all(|o| !o.is_correct));
        assert!(mc.sample_answer.is_none());

        let sa = stubs
            .iter()
            .find(|s| s.question_type == QuestionType::ShortAnswer)
            .expect("short answer");
        assert!(sa.options.is_none());
        assert!(sa.sample_answer.as_deref().unwrap_or("").contains("fractions"));

        let desc = stubs
            .iter()
            .find(|s| s.question_type == QuestionType::Descriptive)
            .expect("descriptive");
        assert!(desc.options.is_none());
        assert!(desc.sample_answer.is_none());
    }

    #[test]
    fn empty_or_blank_tags_fall_back_to_grammar() {
        for input in [tags(&[]), tags(&["  ", ""])] {
            let stubs = generate(&config(2, 50.0, 50.0, 0.0), &input);
            assert!(stubs
                .iter()
                .all(|s| s.concept_tags == vec![FALLBACK_TOPIC_TAG.to_string()]));
        }
    }

    #[test]
    fn emitted_total_is_sum_of_rounded_counts() {
        let stubs = generate(&config(2, 50.0, 25.0, 25.0), &tags(&["x"]));
        assert_eq!(stubs.len(), 3);
        let exact = generate_with(
            &config(2, 50.0, 25.0, 25.0),
            &tags(&["x"]),
            AllocationMethod::LargestRemainder,
        );
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn generation_is_byte_identical_across_calls() {
        let cfg = config(17, 45.0, 35.0, 20.0);
        let t = tags(&["plot", "setting", "character"]);
        let a = serde_json::to_string(&generate(&cfg, &t)).expect("json a");
        let b = serde_json::to_string(&generate(&cfg, &t)).expect("json b");
        assert_eq!(a, b);
    }
}
