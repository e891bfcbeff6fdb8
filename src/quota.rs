use serde::{Deserialize, Serialize};

/// Percentages per question type. Callers keep the sum at 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionTypeRatio {
    pub multiple_choice: f64,
    pub short_answer: f64,
    pub descriptive: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub target_question_count: u32,
    pub question_type_ratio: QuestionTypeRatio,
}

const RATIO_EPSILON: f64 = 1e-6;

impl GenerationConfig {
    /// Form-boundary check. `generate` itself trusts its input.
    pub fn validate(&self, max_question_count: u32) -> Result<(), String> {
        if self.target_question_count == 0 || self.target_question_count > max_question_count {
            return Err(format!(
                "targetQuestionCount must be in 1..={}",
                max_question_count
            ));
        }
        let r = &self.question_type_ratio;
        for (key, pct) in [
            ("multipleChoice", r.multiple_choice),
            ("shortAnswer", r.short_answer),
            ("descriptive", r.descriptive),
        ] {
            if !pct.is_finite() || pct < 0.0 {
                return Err(format!("questionTypeRatio.{} must be >= 0", key));
            }
        }
        let sum = r.multiple_choice + r.short_answer + r.descriptive;
        if (sum - 100.0).abs() > RATIO_EPSILON {
            return Err(format!("questionTypeRatio must sum to 100 (got {})", sum));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Each category rounded on its own; the total may drift from the target.
    #[default]
    IndependentRounding,
    /// Floors plus leftover units by largest fractional part; the total equals the target.
    LargestRemainder,
}

impl AllocationMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "independent_rounding" => Some(Self::IndependentRounding),
            "largest_remainder" => Some(Self::LargestRemainder),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndependentRounding => "independent_rounding",
            Self::LargestRemainder => "largest_remainder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCounts {
    pub multiple_choice: u32,
    pub short_answer: u32,
    pub descriptive: u32,
}

impl QuotaCounts {
    pub fn total(&self) -> u32 {
        self.multiple_choice + self.short_answer + self.descriptive
    }

    /// Signed distance between what is emitted and what was asked for.
    pub fn drift(&self, target: u32) -> i64 {
        i64::from(self.total()) - i64::from(target)
    }
}

/// `floor(x + 0.5)`: halves always go up.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn share(pct: f64, target: u32) -> f64 {
    pct * f64::from(target) / 100.0
}

pub fn allocate(config: &GenerationConfig, method: AllocationMethod) -> QuotaCounts {
    let n = config.target_question_count;
    let r = &config.question_type_ratio;
    let shares = [
        share(r.multiple_choice, n),
        share(r.short_answer, n),
        share(r.descriptive, n),
    ];
    let counts = match method {
        AllocationMethod::IndependentRounding => shares.map(|s| round_half_up(s).max(0.0) as u32),
        AllocationMethod::LargestRemainder => largest_remainder(shares, n),
    };
    QuotaCounts {
        multiple_choice: counts[0],
        short_answer: counts[1],
        descriptive: counts[2],
    }
}

fn largest_remainder(shares: [f64; 3], target: u32) -> [u32; 3] {
    let mut counts = shares.map(|s| s.max(0.0).floor() as u32);
    let assigned: u32 = counts.iter().sum();
    let mut order = [0usize, 1, 2];
    // Stable sort keeps category order on equal remainders.
    order.sort_by(|&a, &b| {
        let ra = shares[a] - shares[a].floor();
        let rb = shares[b] - shares[b].floor();
        rb.total_cmp(&ra)
    });
    let leftover = target.saturating_sub(assigned) as usize;
    for &i in order.iter().cycle().take(leftover) {
        counts[i] += 1;
    }
    counts
}
