//! System prompts for the Gemini-backed capabilities.

use crate::models::{AudioType, InputType};

/// Input-kind-specific breakpoint guidance for the segmentation model.
pub fn segmentation_system(input_type: InputType, target_count: usize) -> String {
    let guidance = match input_type {
        InputType::Educational => {
            "Break at topic shifts: a new concept, a new worked example, a new definition. \
             Keep an explanation and the example that illustrates it together."
        }
        InputType::Financial => {
            "Break at reporting-section shifts: results, guidance, risk factors, commentary. \
             Keep a figure and the sentence interpreting it together."
        }
        InputType::Fictional => {
            "Break at scene changes: a new location, a time jump, a change of point of view. \
             Never split dialogue from its attribution."
        }
    };

    format!(
        "You segment text into coherent parts for narration.\n\
         {guidance}\n\
         Aim for about {target_count} parts.\n\n\
         Respond ONLY with a JSON object of the form {{\"boundaries\": [int, ...]}}.\n\
         Each boundary is a 0-based EXCLUSIVE end position counted in user-perceived \
         characters (an emoji counts as one character). Boundaries must be strictly \
         ascending, every boundary must fall at the end of a sentence, and the final \
         boundary must equal the total character count of the text."
    )
}

/// JSON schema for the boundary response, used when the provider supports
/// structured output.
pub fn boundaries_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "boundaries": {
                "type": "array",
                "items": { "type": "integer" }
            }
        },
        "required": ["boundaries"]
    })
}

pub fn narration_system(audio_type: AudioType, input_type: InputType) -> String {
    let register = match audio_type {
        AudioType::FreeSpeech => {
            "Write a flowing narration script in natural spoken prose, first person plural \
             avoided, no stage directions."
        }
        AudioType::Podcast => {
            "Write a lively podcast-style narration script: conversational, direct address \
             to the listener, short sentences."
        }
    };
    let tone = match input_type {
        InputType::Educational => "Explain clearly, define terms on first use.",
        InputType::Financial => "Stay precise with figures, neutral in tone.",
        InputType::Fictional => "Preserve mood and pacing, do not summarize away dialogue.",
    };

    format!(
        "{register}\n{tone}\n\
         Respond with the script text only: no headings, no markdown, no preamble."
    )
}

/// Spoken-style steering line prepended to the TTS request.
pub fn tts_instruction(audio_type: AudioType) -> &'static str {
    match audio_type {
        AudioType::FreeSpeech => "Read the following aloud in a calm, even voice:",
        AudioType::Podcast => "Read the following aloud with podcast energy and warmth:",
    }
}

/// Paraphrase-not-transcribe instruction for vision extraction.
pub fn vision_system(input_type: InputType) -> String {
    let register = match input_type {
        InputType::Educational => "an instructor summarizing teaching material",
        InputType::Financial => "an analyst summarizing a financial document",
        InputType::Fictional => "an editor retelling a passage of fiction",
    };

    format!(
        "You are {register}. Express the document's content in your own words as \
         connected prose. Paraphrase; do NOT transcribe verbatim, do not describe \
         the layout, and do not mention that you are reading a document."
    )
}

pub fn image_prompt_system(input_type: InputType) -> String {
    format!(
        "Write a single image-generation prompt (one paragraph, no lists) that \
         illustrates the passage below. Style: {}. Do not include any text or \
         lettering in the scene.",
        style_prefix(input_type)
    )
}

/// Deterministic style prefix, also used for the fallback prompt when the
/// prompt model returns nothing.
pub fn style_prefix(input_type: InputType) -> &'static str {
    match input_type {
        InputType::Educational => "clean modern flat illustration, soft colors",
        InputType::Financial => "minimal editorial illustration, muted palette",
        InputType::Fictional => "atmospheric digital painting, cinematic light",
    }
}

pub fn fact_check_system() -> &'static str {
    "Assess the factual accuracy of the claim. Respond ONLY with a JSON object \
     {\"verdict\": \"accurate\" | \"inaccurate\" | \"unverifiable\", \"explanation\": string}."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmentation_prompt_names_target() {
        let p = segmentation_system(InputType::Educational, 5);
        assert!(p.contains("about 5 parts"));
        assert!(p.contains("boundaries"));
    }

    #[test]
    fn style_prefix_is_distinct_per_kind() {
        let all = [
            style_prefix(InputType::Educational),
            style_prefix(InputType::Financial),
            style_prefix(InputType::Fictional),
        ];
        assert_eq!(all.len(), 3);
        assert_ne!(all[0], all[1]);
        assert_ne!(all[1], all[2]);
    }
}
