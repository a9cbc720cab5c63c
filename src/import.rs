//! Question bank import (JSON, CSV and Excel)

use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::error::{QuizError, Result};
use crate::questions::{
    Answer, Category, Difficulty, Question, QuestionBank, QuestionContext, QuestionType,
};

/// Separator for list cells (options, explanation steps)
const LIST_SEPARATOR: char = '|';

const DEFAULT_TIME_LIMIT: u32 = 60;

/// Load a bank file, picking the parser from the extension
pub fn load_bank_file(path: &Path) -> Result<QuestionBank> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let bank = match extension.as_str() {
        "json" => QuestionBank::from_json(&std::fs::read_to_string(path)?)?,
        "csv" => QuestionBank::from_questions(parse_csv(path)?)?,
        "xlsx" | "xls" => QuestionBank::from_questions(parse_excel(path)?)?,
        _ => return Err(QuizError::Import(format!("unsupported file format: .{}", extension))),
    };

    info!(path = %path.display(), questions = bank.len(), "loaded question bank");
    Ok(bank)
}

/// Column index mapping
#[derive(Debug, Default, Clone)]
struct ColumnMapping {
    id: Option<usize>,
    question_type: usize,
    difficulty: usize,
    category: usize,
    prompt: usize,
    answer: usize,
    options: Option<usize>,
    explanation: Option<usize>,
    time_limit: Option<usize>,
    xp_reward: Option<usize>,
    context: Option<usize>,
}

/// Detect column indices from header names
fn detect_columns(headers: &[String]) -> Result<ColumnMapping> {
    let mut mapping = ColumnMapping::default();
    let mut required = [None::<usize>; 5];

    for (i, header) in headers.iter().enumerate() {
        match header.to_lowercase().trim() {
            "id" => mapping.id = Some(i),
            "type" | "question_type" => required[0] = Some(i),
            "difficulty" | "level" => required[1] = Some(i),
            "category" => required[2] = Some(i),
            "prompt" | "question" => required[3] = Some(i),
            "answer" => required[4] = Some(i),
            "options" => mapping.options = Some(i),
            "explanation" => mapping.explanation = Some(i),
            "time_limit" | "time_limit_seconds" => mapping.time_limit = Some(i),
            "xp_reward" | "xp" => mapping.xp_reward = Some(i),
            "context" => mapping.context = Some(i),
            _ => {}
        }
    }

    let names = ["type", "difficulty", "category", "prompt", "answer"];
    let missing: Vec<&str> = names
        .iter()
        .zip(required.iter())
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(QuizError::Import(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    mapping.question_type = required[0].unwrap_or_default();
    mapping.difficulty = required[1].unwrap_or_default();
    mapping.category = required[2].unwrap_or_default();
    mapping.prompt = required[3].unwrap_or_default();
    mapping.answer = required[4].unwrap_or_default();
    Ok(mapping)
}

/// Build a question from one row of trimmed cells. Blank rows yield `None`.
fn build_question(mapping: &ColumnMapping, row: &[String], line: usize) -> Result<Option<Question>> {
    let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
    let optional = |i: Option<usize>| i.map(cell).filter(|s| !s.is_empty());

    let prompt = cell(mapping.prompt);
    let answer = cell(mapping.answer);
    if prompt.is_empty() && answer.is_empty() {
        return Ok(None);
    }

    let bad = |what: &str, value: &str| QuizError::Import(format!("row {}: invalid {} '{}'", line, what, value));

    let question_type = QuestionType::parse(cell(mapping.question_type))
        .ok_or_else(|| bad("type", cell(mapping.question_type)))?;
    let difficulty = cell(mapping.difficulty)
        .parse::<f64>()
        .ok()
        .filter(|d| d.fract() == 0.0 && (1.0..=4.0).contains(d))
        .and_then(|d| Difficulty::new(d as u8).ok())
        .ok_or_else(|| bad("difficulty", cell(mapping.difficulty)))?;
    let category = Category::parse(cell(mapping.category))
        .ok_or_else(|| bad("category", cell(mapping.category)))?;
    let context = match optional(mapping.context) {
        Some(c) if c.eq_ignore_ascii_case("nicaragua") => QuestionContext::Nicaragua,
        _ => QuestionContext::General,
    };

    let answer = match answer.parse::<f64>() {
        Ok(n) if n.is_finite() => Answer::Numeric(n),
        _ => Answer::Text(answer.to_string()),
    };

    let time_limit_seconds = match optional(mapping.time_limit) {
        Some(v) => parse_count(v).ok_or_else(|| bad("time_limit", v))?,
        None => DEFAULT_TIME_LIMIT,
    };
    let xp_reward = match optional(mapping.xp_reward) {
        Some(v) => parse_count(v).ok_or_else(|| bad("xp_reward", v))?,
        None => u32::from(difficulty.get()) * 10,
    };

    Ok(Some(Question {
        id: optional(mapping.id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("import_{:03}", line)),
        question_type,
        difficulty,
        category,
        context,
        prompt: prompt.to_string(),
        answer,
        options: optional(mapping.options).map(split_list),
        explanation: optional(mapping.explanation).map(split_list).unwrap_or_default(),
        time_limit_seconds,
        xp_reward,
    }))
}

/// Whole non-negative number; spreadsheets hand these over as floats
fn parse_count(value: &str) -> Option<u32> {
    if let Ok(n) = value.parse::<u32>() {
        return Some(n);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|f| f.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(f))
        .map(|f| f as u32)
}

fn split_list(cell: &str) -> Vec<String> {
    cell.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_csv(path: &Path) -> Result<Vec<Question>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| QuizError::Import(format!("failed to open CSV file: {}", e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| QuizError::Import(format!("failed to read CSV headers: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mapping = detect_columns(&headers)?;

    let mut questions = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| QuizError::Import(format!("failed to read CSV row: {}", e)))?;
        let row: Vec<String> = record.iter().map(|s| s.trim().to_string()).collect();
        // Header is line 1
        if let Some(q) = build_question(&mapping, &row, i + 2)? {
            questions.push(q);
        }
    }
    Ok(questions)
}

fn parse_excel(path: &Path) -> Result<Vec<Question>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| QuizError::Import(format!("failed to open Excel file: {}", e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| QuizError::Import("no sheets found in Excel file".into()))?;
    if workbook.sheet_names().len() > 1 {
        warn!(sheet = %sheet_name, "workbook has several sheets, importing only the first");
    }

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| QuizError::Import(format!("failed to read sheet: {}", e)))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| QuizError::Import("empty file, no header row".into()))?;
    let headers: Vec<String> = header_row.iter().map(cell_string).collect();
    let mapping = detect_columns(&headers)?;

    let mut questions = Vec::new();
    for (i, row) in rows.enumerate() {
        let row: Vec<String> = row.iter().map(cell_string).collect();
        if let Some(q) = build_question(&mapping, &row, i + 2)? {
            questions.push(q);
        }
    }
    Ok(questions)
}

fn cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}
