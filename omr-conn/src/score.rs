//! 评分：逐题比对标准答案与学生作答

use crate::answer::AnswerMap;
use crate::error::ScoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub correct_count: usize,
    pub total_questions: usize,
    /// 百分比，保留两位小数
    pub percentage: f64,
    pub passed: bool,
    /// 答错或未作答的题号
    #[serde(default)]
    pub missed_questions: Vec<u32>,
}

/// 按标准答案中的每道题计分；学生未作答或缺题均计为错误
pub fn score_sheet(
    key: &AnswerMap,
    student: &AnswerMap,
    pass_threshold: f64,
) -> Result<ScoreResult, ScoreError> {
    if !pass_threshold.is_finite() || !(0.0..=100.0).contains(&pass_threshold) {
        return Err(ScoreError::InvalidThreshold(pass_threshold));
    }
    if key.is_empty() {
        return Err(ScoreError::EmptyKey);
    }

    let mut correct_count = 0;
    let mut missed_questions = Vec::new();
    for (question, expected) in key.iter() {
        let given = student.get(question).flatten();
        if expected.is_some() && given == expected {
            correct_count += 1;
        } else {
            missed_questions.push(question);
        }
    }

    let total_questions = key.len();
    let raw = correct_count as f64 / total_questions as f64 * 100.0;
    Ok(ScoreResult {
        correct_count,
        total_questions,
        percentage: (raw * 100.0).round() / 100.0,
        passed: raw >= pass_threshold,
        missed_questions,
    })
}

/// 在评分前校验两张答题卡识别出的题目数量一致
pub fn score_sheet_checked(
    key: &AnswerMap,
    student: &AnswerMap,
    pass_threshold: f64,
    strict_row_count: bool,
) -> Result<ScoreResult, ScoreError> {
    if strict_row_count && !key.is_empty() && key.len() != student.len() {
        return Err(ScoreError::RowCountMismatch {
            key: key.len(),
            student: student.len(),
        });
    }
    score_sheet(key, student, pass_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_of_three() {
        let key = AnswerMap::from([(1, 'A'), (2, 'B'), (3, 'C')]);
        let student = AnswerMap::from([(1, 'A'), (2, 'C'), (3, 'C')]);
        let result = score_sheet(&key, &student, 60.0).unwrap();
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.total_questions, 3);
        assert_eq!(result.percentage, 66.67);
        assert!(result.passed);
        assert_eq!(result.missed_questions, vec![2]);
    }

    #[test]
    fn test_empty_key() {
        let student = AnswerMap::from([(1, 'A')]);
        let err = score_sheet(&AnswerMap::default(), &student, 60.0).unwrap_err();
        assert_eq!(err, ScoreError::EmptyKey);
    }

    #[test]
    fn test_missing_and_unanswered_are_wrong() {
        let key = AnswerMap::from([(1, 'A'), (2, 'B'), (3, 'C'), (4, 'D')]);
        let student: AnswerMap = vec![(1, Some('A')), (2, None)].into_iter().collect();
        let result = score_sheet(&key, &student, 50.0).unwrap();
        assert_eq!(result.correct_count, 1);
        assert_eq!(result.percentage, 25.0);
        assert!(!result.passed);
        assert_eq!(result.missed_questions, vec![2, 3, 4]);
    }

    #[test]
    fn test_unanswered_key_question_never_matches() {
        let key: AnswerMap = vec![(1, None), (2, Some('B'))].into_iter().collect();
        let student: AnswerMap = vec![(1, None), (2, Some('B'))].into_iter().collect();
        let result = score_sheet(&key, &student, 50.0).unwrap();
        assert_eq!(result.correct_count, 1);
        assert!(result.passed);
    }

    #[test]
    fn test_pass_boundary_is_inclusive() {
        let key = AnswerMap::from([(1, 'A'), (2, 'B')]);
        let student = AnswerMap::from([(1, 'A'), (2, 'C')]);
        assert!(score_sheet(&key, &student, 50.0).unwrap().passed);
        assert!(!score_sheet(&key, &student, 50.01).unwrap().passed);
    }

    #[test]
    fn test_invalid_threshold() {
        let key = AnswerMap::from([(1, 'A')]);
        assert!(matches!(
            score_sheet(&key, &key, 120.0),
            Err(ScoreError::InvalidThreshold(_))
        ));
        assert!(matches!(
            score_sheet(&key, &key, f64::NAN),
            Err(ScoreError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_row_count_mismatch() {
        let key = AnswerMap::from([(1, 'A'), (2, 'B'), (3, 'C')]);
        let student = AnswerMap::from([(1, 'A'), (2, 'B')]);
        let err = score_sheet_checked(&key, &student, 60.0, true).unwrap_err();
        assert_eq!(err, ScoreError::RowCountMismatch { key: 3, student: 2 });
        let lenient = score_sheet_checked(&key, &student, 60.0, false).unwrap();
        assert_eq!(lenient.correct_count, 2);
    }
}
