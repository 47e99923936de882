//! On-disk tokenizer fixtures

use std::path::{Path, PathBuf};

pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kanana-tokenizer-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Word-level tokenizer over `a`/`b` whose tokenizer.json asks for
/// truncation to 2 tokens and fixed padding to 8. With `cls` a `[CLS]`
/// token (id 3) is prepended to every sequence.
pub fn write_word_level_tokenizer(dir: &Path, cls: bool) -> PathBuf {
    let post_processor = if cls {
        serde_json::json!({
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}}
            ],
            "pair": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}}
            ],
            "special_tokens": {
                "[CLS]": {"id": "[CLS]", "ids": [3], "tokens": ["[CLS]"]}
            }
        })
    } else {
        serde_json::Value::Null
    };

    let tokenizer = serde_json::json!({
        "version": "1.0",
        "truncation": {
            "direction": "Right",
            "max_length": 2,
            "strategy": "LongestFirst",
            "stride": 0
        },
        "padding": {
            "strategy": {"Fixed": 8},
            "direction": "Right",
            "pad_to_multiple_of": null,
            "pad_id": 4,
            "pad_type_id": 0,
            "pad_token": "[PAD]"
        },
        "added_tokens": [
            {"id": 3, "content": "[CLS]", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true},
            {"id": 4, "content": "[PAD]", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": post_processor,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "a": 1, "b": 2, "[CLS]": 3, "[PAD]": 4},
            "unk_token": "[UNK]"
        }
    });

    let path = dir.join("tokenizer.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&tokenizer).unwrap()).unwrap();
    path
}
