// Prompt constants for the stages that call the text generator.
// Placeholders are filled with llm_client::prompts::fill.

/// Replace `{posting}` before sending. Sent with `llm_client::prompts::JSON_ONLY_SYSTEM`.
pub const MANUAL_PARSE_PROMPT: &str = r#"Analyse the job posting text below and extract its key information.

POSTING TEXT:
"""
{posting}
"""

Return a JSON object with exactly these keys:
{
  "title": "Job title",
  "company": "Company name (or \"Not specified\")",
  "location": "City or region (or \"Not specified\")",
  "responsibilities": "Summary of the tasks and responsibilities",
  "profile": "Summary of the required profile and skills"
}
"#;

/// System prompt for the posting rewrite.
pub const JOB_SUMMARY_SYSTEM: &str = "You are an expert recruiter. You condense job postings \
    into short, factual summaries optimised for semantic matching against CVs. \
    Never invent requirements that are not in the posting.";

/// Replace `{title}`, `{company}`, `{location}`, `{responsibilities}` and `{profile}`.
pub const JOB_SUMMARY_PROMPT: &str = r#"Summarise this job posting for CV matching.

TITLE: {title}
COMPANY: {company}
LOCATION: {location}

RESPONSIBILITIES:
{responsibilities}

PROFILE:
{profile}

Answer in this format and nothing else:
MATCHING_SUMMARY:
- Role: <one line>
- Key skills: <comma separated hard skills and tools>
- Experience: <level and years if stated>
- Domain: <industry or business domain>
"#;

/// Marker the summary prompt asks the model to open with.
pub const SUMMARY_MARKER: &str = "MATCHING_SUMMARY:";

/// System prompt for the CV synthesis.
pub const CV_SYNTHESIS_SYSTEM: &str = "You are an expert career coach. You rewrite CVs into \
    concise, well structured profiles that keep every concrete skill, tool, degree and \
    experience from the source. Never invent anything.";

/// Replace `{cv}`.
pub const CV_SYNTHESIS_PROMPT: &str = r#"Rewrite the CV below into a synthesis used to match the candidate against job postings.

CV TEXT (extracted from PDF, page markers included):
"""
{cv}
"""

Structure the synthesis as:
PROFILE: <two sentences>
HARD SKILLS: <comma separated list>
EXPERIENCE: <one line per position: title, company, duration, key results>
EDUCATION: <one line per degree>
LANGUAGES: <list>
"#;

/// System prompt for match explanations.
pub const EXPLAIN_SYSTEM: &str = "You are a senior recruiter. You judge candidate/job fit \
    honestly and briefly, citing concrete skills from both sides.";

/// Replace `{cv}`, `{title}`, `{company}` and `{summary}`.
pub const EXPLAIN_PROMPT: &str = r#"Compare the candidate with the job posting.

CANDIDATE:
{cv}

JOB: {title} at {company}
{summary}

Reply with at most three short bullet points naming the matching skills
and the main gaps, then end with exactly one verdict line:
"Strong match", "Partial match" or "No match".
"#;
