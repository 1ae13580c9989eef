//! 答案表：题号（从 1 开始，按存活行顺序连续编号）→ 选项字母或未作答

use crate::classify::RowDecision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 构建后不可修改；评分总是比较两份独立的答案表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap {
    answers: BTreeMap<u32, Option<char>>,
}

impl AnswerMap {
    /// 由逐行判定结果构建，题号与行顺序一一对应
    pub fn from_decisions(decisions: &[RowDecision]) -> Self {
        decisions
            .iter()
            .enumerate()
            .map(|(index, decision)| (index as u32 + 1, decision.selected))
            .collect()
    }

    /// 题号对应的作答；题目不存在时返回 None，未作答时返回 Some(None)
    pub fn get(&self, question: u32) -> Option<Option<char>> {
        self.answers.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// 已作答的题目数
    pub fn answered(&self) -> usize {
        self.answers.values().filter(|answer| answer.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<char>)> + '_ {
        self.answers.iter().map(|(&question, &answer)| (question, answer))
    }
}

impl FromIterator<(u32, Option<char>)> for AnswerMap {
    fn from_iter<T: IntoIterator<Item = (u32, Option<char>)>>(iter: T) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(u32, char); N]> for AnswerMap {
    fn from(pairs: [(u32, char); N]) -> Self {
        pairs
            .into_iter()
            .map(|(question, letter)| (question, Some(letter)))
            .collect()
    }
}
