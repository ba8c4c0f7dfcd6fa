//! Prompt strategies and the registry that resolves them.
//!
//! Each content type is one variant of [`Strategy`]. A strategy is a pure
//! descriptor: which request fields it needs, the system components it falls
//! back to, its default length, and how it lays out the final instructions.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::errors::GenerationError;
use crate::generator::grounding::GroundingFact;
use crate::types::{
    ContentType, GenerationRequest, LinkedInAuthor, LinkedInStyle, SystemComponents, TargetLength,
};

/// Platform limit for a LinkedIn post, hashtags included.
pub const LINKEDIN_CHAR_CEILING: usize = 3000;

/// Heading a case study must open its summary section with.
pub const EXECUTIVE_SUMMARY_MARKER: &str = "## Executive summary";

/// Heading of the long-form section of a case study.
pub const FULL_STORY_MARKER: &str = "## Full story";

/// Request fields a strategy can insist on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField {
    Topic,
    TargetAudience,
    Objective,
    CallToAction,
    PrimaryKeywords,
}

impl RequestField {
    pub fn name(&self) -> &'static str {
        match self {
            RequestField::Topic => "topic",
            RequestField::TargetAudience => "target_audience",
            RequestField::Objective => "objective",
            RequestField::CallToAction => "call_to_action",
            RequestField::PrimaryKeywords => "primary_keywords",
        }
    }

    pub fn is_present(&self, request: &GenerationRequest) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self {
            RequestField::Topic => !request.topic.trim().is_empty(),
            RequestField::TargetAudience => filled(&request.target_audience),
            RequestField::Objective => filled(&request.objective),
            RequestField::CallToAction => filled(&request.call_to_action),
            RequestField::PrimaryKeywords => request.primary_keywords.iter().any(|k| !k.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    GeneralInterestBlog,
    CaseStudyBlog,
    LinkedInPost(LinkedInStyle),
}

impl Strategy {
    pub fn content_type(&self) -> ContentType {
        match self {
            Strategy::GeneralInterestBlog => ContentType::GeneralInterestBlog,
            Strategy::CaseStudyBlog => ContentType::CaseStudyBlog,
            Strategy::LinkedInPost(_) => ContentType::LinkedInPost,
        }
    }

    pub fn required_fields(&self) -> &'static [RequestField] {
        match self {
            Strategy::GeneralInterestBlog => &[RequestField::Topic],
            Strategy::CaseStudyBlog => &[RequestField::Topic],
            Strategy::LinkedInPost(_) => &[RequestField::Topic],
        }
    }

    /// Whether an uploaded document may be attached.
    pub fn accepts_document(&self) -> bool {
        matches!(self, Strategy::CaseStudyBlog)
    }

    /// Whether a document or at least one reference URL must be supplied.
    pub fn requires_source(&self) -> bool {
        matches!(self, Strategy::CaseStudyBlog)
    }

    /// Whether extracted facts feed into this strategy's prompt.
    pub fn uses_grounding(&self) -> bool {
        self.content_type().is_blog()
    }

    pub fn default_target_length(&self) -> TargetLength {
        match self {
            Strategy::GeneralInterestBlog => TargetLength::words(800, 1200),
            Strategy::CaseStudyBlog => TargetLength::words(800, 1500),
            Strategy::LinkedInPost(_) => TargetLength::words(120, 250),
        }
    }

    pub fn hard_char_ceiling(&self) -> Option<usize> {
        match self {
            Strategy::LinkedInPost(_) => Some(LINKEDIN_CHAR_CEILING),
            _ => None,
        }
    }

    /// Strings the output must contain verbatim.
    pub fn required_markers(&self, request: &GenerationRequest) -> Vec<String> {
        let mut markers = Vec::new();
        if self.content_type().is_blog() {
            if let Some(cta) = request.cta() {
                markers.push(cta.to_string());
            }
        }
        if matches!(self, Strategy::CaseStudyBlog) {
            markers.push(EXECUTIVE_SUMMARY_MARKER.to_string());
        }
        markers
    }

    pub fn default_components(&self) -> SystemComponents {
        match self {
            Strategy::GeneralInterestBlog => components(
                "content specialist for blogs with experience in SEO and digital storytelling",
                "write complete, informative and engaging articles",
                "Balanced between professional and informal depending on the subject. A conversational voice that builds a connection with the reader.",
                "Balance professional and informal registers according to the subject.",
                "- An attractive title that sparks curiosity and contains the main keyword.\n- A captivating introduction that frames the problem or subject.\n- Sections with descriptive H2/H3 subheadings suitable for SEO.\n- A conclusion that sums up the key points and leads into the call to action.\n- A short FAQ when it fits the subject.",
                "- Short paragraphs of three to four lines.\n- Lists, bullet points and bold text for key information.\n- Practical examples and relevant cases.\n- Suggested images or visuals at strategic points.",
                Some("- Distribute primary and secondary keywords naturally.\n- Provide a meta description of 150-160 characters.\n- Suggest relevant internal and external links."),
                "- Do not make up facts or unverified data.\n- Do not plagiarise existing content.\n- Avoid heavy jargon unless the audience requires it.\n- Prefer quality over quantity.",
                None,
                None,
            ),
            Strategy::CaseStudyBlog => components(
                "specialist in customer success stories and business storytelling",
                "write persuasive articles that highlight the achievements and results of real projects",
                "Professional yet inspiring, focused on results and delivered value.",
                "Narrative style that shows the transformation and its outcome. Alternate hard data with story.",
                "- A striking title naming the main result or the company.\n- An executive summary of the achievements.\n- The initial challenge or problem.\n- The solution that was implemented.\n- Results with specific metrics.\n- Testimonials or quotes when the source provides them.\n- Lessons learned and a call to action.",
                "- Short paragraphs.\n- Highlight key figures and percentages.\n- Bullet points for benefits.\n- Clearly separated sections.\n- Suggest where before/after images could go.",
                Some("- Name the company or industry in the title and subheadings.\n- Use terms related to results and solutions.\n- Write a meta description that summarises the main achievement."),
                "- Never invent data or results that are not in the source material.\n- Do not disclose confidential information.\n- Balance facts and narrative.\n- Do not exaggerate results.",
                None,
                Some("Produce TWO versions: an executive summary of 150-200 words and a complete, detailed story. The summary must capture the essence and the main results."),
            ),
            Strategy::LinkedInPost(style) => linkedin_components(*style),
        }
    }

    /// Build the system and user instructions.
    ///
    /// `facts` is `Some` only when the strategy uses grounding and extraction
    /// produced at least one fact. `char_ceiling` is the character limit the
    /// post is held to, when the strategy has one.
    pub fn compose(
        &self,
        request: &GenerationRequest,
        components: &SystemComponents,
        facts: Option<&[GroundingFact]>,
        length_instruction: &str,
        char_ceiling: Option<usize>,
    ) -> (String, String) {
        let mut system = render_system(components);
        if let Strategy::LinkedInPost(_) = self {
            if let Some(persona) = request.author.and_then(author_persona) {
                let _ = write!(system, "\n\nAUTHOR VOICE:\n{persona}");
            }
        }
        let mut user = String::new();

        let _ = writeln!(user, "Topic: {}", request.topic.trim());
        push_list(&mut user, "Primary keywords", &request.primary_keywords);
        push_list(&mut user, "Secondary keywords", &request.secondary_keywords);
        let _ = writeln!(user, "Length: {length_instruction}");
        push_opt(&mut user, "Target audience", request.target_audience.as_deref());
        push_opt(&mut user, "Objective", request.objective.as_deref());
        push_opt(&mut user, "Specific tone", request.tone.as_deref());
        push_opt(&mut user, "Call to action", request.cta());
        push_list(&mut user, "Elements to avoid", &request.avoid);
        let _ = writeln!(user, "Output language: {}", request.language());

        match self {
            Strategy::GeneralInterestBlog => {
                push_list(&mut user, "Reference URLs", &request.reference_urls);
                push_opt(&mut user, "Additional comments", request.additional_comments.as_deref());
                push_facts(&mut user, "Background facts from the reference material", facts);
                user.push('\n');
                user.push_str(
                    "Write a complete blog article in Markdown about the topic above. \
                     Start with the title as a level-one heading.",
                );
                push_blog_tail(&mut user, request);
            }
            Strategy::CaseStudyBlog => {
                push_list(&mut user, "Reference URLs", &request.reference_urls);
                push_opt(&mut user, "Additional comments", request.additional_comments.as_deref());
                match facts {
                    Some(_) => push_facts(
                        &mut user,
                        "Facts extracted from the case material (use them as the primary source)",
                        facts,
                    ),
                    None => {
                        user.push_str(
                            "\nNo usable facts could be extracted from the case material. \
                             Write from the topic alone and do not state specific figures.\n",
                        );
                    }
                }
                user.push('\n');
                let _ = write!(
                    user,
                    "Write a customer success story in Markdown. Start with the title as a \
                     level-one heading, then a section headed exactly \"{EXECUTIVE_SUMMARY_MARKER}\" \
                     (150-200 words), then a section headed exactly \"{FULL_STORY_MARKER}\"."
                );
                push_blog_tail(&mut user, request);
            }
            Strategy::LinkedInPost(style) => {
                push_list(&mut user, "Reference URLs", &request.reference_urls);
                push_opt(&mut user, "Additional information", request.additional_comments.as_deref());
                user.push('\n');
                user.push_str(linkedin_closing(*style));
                let ceiling = char_ceiling.unwrap_or(LINKEDIN_CHAR_CEILING);
                let _ = write!(
                    user,
                    "\nKeep the whole post under {ceiling} characters, hashtags included. \
                     Finish with three or four relevant hashtags."
                );
                if let Some(cta) = request.cta() {
                    let _ = write!(user, "\nClose with this call to action: \"{cta}\"");
                }
            }
        }

        (system, user.trim_end().to_string())
    }
}

/// Maps content types to strategies. Built once from configuration and then
/// shared read-only.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    enabled: HashSet<ContentType>,
}

impl StrategyRegistry {
    pub fn new(enabled: &[ContentType]) -> Self {
        Self {
            enabled: enabled.iter().copied().collect(),
        }
    }

    /// Registry serving every known content type.
    pub fn all() -> Self {
        Self::new(&ContentType::ALL)
    }

    /// Resolve the base strategy for a wire content type.
    pub fn resolve(&self, content_type: &str) -> Result<Strategy, GenerationError> {
        self.resolve_with(content_type, None)
    }

    /// Resolve a (content type, subtype) pair.
    pub fn resolve_with(
        &self,
        content_type: &str,
        style: Option<LinkedInStyle>,
    ) -> Result<Strategy, GenerationError> {
        let parsed: ContentType = content_type.parse()?;
        if !self.enabled.contains(&parsed) {
            return Err(GenerationError::UnknownContentType {
                content_type: content_type.to_string(),
            });
        }
        Ok(match parsed {
            ContentType::GeneralInterestBlog => Strategy::GeneralInterestBlog,
            ContentType::CaseStudyBlog => Strategy::CaseStudyBlog,
            ContentType::LinkedInPost => Strategy::LinkedInPost(style.unwrap_or_default()),
        })
    }

    pub fn resolve_for(&self, request: &GenerationRequest) -> Result<Strategy, GenerationError> {
        self.resolve_with(&request.content_type, request.linkedin_style)
    }
}

#[allow(clippy::too_many_arguments)]
fn components(
    role: &str,
    objective: &str,
    tone: &str,
    style: &str,
    structure: &str,
    format: &str,
    seo: Option<&str>,
    limitations: &str,
    engagement: Option<&str>,
    additional: Option<&str>,
) -> SystemComponents {
    SystemComponents {
        role_description: Some(role.to_string()),
        content_objective: Some(objective.to_string()),
        tone: Some(tone.to_string()),
        style_guidance: Some(style.to_string()),
        structure_description: Some(structure.to_string()),
        format_guide: Some(format.to_string()),
        seo_guidelines: seo.map(str::to_string),
        limitations: Some(limitations.to_string()),
        engagement_tips: engagement.map(str::to_string),
        additional_instructions: additional.map(str::to_string),
    }
}

const LINKEDIN_LIMITATIONS: &str = "- Avoid overly promotional content.\n- No more than four hashtags.\n- Avoid long walls of text.\n- No heavy technical jargon.";

fn linkedin_components(style: LinkedInStyle) -> SystemComponents {
    match style {
        LinkedInStyle::Leadership => components(
            "visionary leader and business strategist",
            "share strategic perspectives that inspire other leaders",
            "Authoritative but approachable, focused on strategic value.",
            "Visionary, inspiring and results oriented.",
            "- Open with a deep reflection or a lesson learned.\n- Develop one key strategic idea.\n- Challenge conventional thinking.\n- Close with a reflective question or an inspiring call to action.",
            "- Concise, powerful paragraphs.\n- One or two standout sentences.\n- A strong metaphor or analogy.\n- At most one well-placed emoji.",
            None,
            LINKEDIN_LIMITATIONS,
            Some("- Share a personal leadership lesson.\n- Mention a challenge that was overcome.\n- Talk about where the industry is heading.\n- Ask for opinions on strategic approaches."),
            Some("Show confidence and vision without arrogance."),
        ),
        LinkedInStyle::BehindTheScenes => components(
            "transparent leader who shares the day-to-day of the business",
            "humanise the brand by showing internal processes and everyday work",
            "Conversational, honest and transparent.",
            "Authentic and close, revealing what usually stays hidden.",
            "- Set the scene.\n- Describe the internal process or situation.\n- Share lessons or personal reflections.\n- Connect with the company's values.\n- End with a personal note or a question.",
            "- Narrative, first person.\n- Specific details that feel authentic.\n- Emojis that convey real emotion.\n- Consider mentioning team members.",
            None,
            LINKEDIN_LIMITATIONS,
            Some("- Share a challenge and how it was solved.\n- Show the before and after of a process.\n- Talk about mistakes and what they taught.\n- Ask for opinions on decisions."),
            Some("Be transparent while staying professional."),
        ),
        LinkedInStyle::Wins => components(
            "leader who celebrates achievements and recognises contributions",
            "share and celebrate successes, milestones and recognitions",
            "Enthusiastic, genuinely proud and grateful.",
            "Celebratory, proud but humble, focused on impact.",
            "- Announce the achievement clearly.\n- Explain why it matters.\n- Recognise the people involved.\n- Share what made it work.\n- Express gratitude and look ahead.",
            "- Punchy, celebratory sentences.\n- Festive emojis used sparingly.\n- Numbers or metrics where relevant.\n- Exclamation marks in moderation.",
            None,
            LINKEDIN_LIMITATIONS,
            Some("- Share the journey, not only the result.\n- Mention obstacles overcome.\n- Thank people specifically.\n- Invite others to share their own wins."),
            Some("Celebrate without boasting and always credit the collective effort."),
        ),
        LinkedInStyle::CeoJourney => components(
            "CEO sharing their path and leadership experiences",
            "tell personal leadership experiences that inspire and teach",
            "Authentic, reflective, vulnerable yet confident.",
            "Narrative, reflective and personal, focused on growth.",
            "- Open with a decisive or difficult moment.\n- Tell the experience or lesson.\n- Reflect on how it shaped your leadership.\n- Tie it to principles or values.\n- Close with a conclusion or advice.",
            "- Narrative with a clear arc.\n- First person.\n- Concrete, authentic details.\n- A before/after structure where it helps.",
            None,
            LINKEDIN_LIMITATIONS,
            Some("- Share a failure and how it changed you.\n- Mention mentors or key influences.\n- Describe a moment of doubt or a pivot.\n- Ask about similar experiences."),
            Some("Balance vulnerability with resilience."),
        ),
        LinkedInStyle::HotTakes => components(
            "opinion leader who challenges conventional thinking",
            "present counter-intuitive or disruptive views that spark debate",
            "Assertive, confident and slightly provocative.",
            "Provocative and challenging, but well argued.",
            "- Open with a bold, surprising statement.\n- Challenge an established belief or practice.\n- Argue the position with examples or logic.\n- Anticipate objections.\n- Invite debate with a question.",
            "- Short, punchy sentences.\n- Concise paragraphs.\n- Numbered points for key arguments.\n- Few emojis.",
            None,
            LINKEDIN_LIMITATIONS,
            Some("- Question a common industry practice.\n- Contradict an accepted truth.\n- End by asking whether readers agree or disagree."),
            Some("Be provocative but professional; every claim needs an argument behind it."),
        ),
    }
}

fn linkedin_closing(style: LinkedInStyle) -> &'static str {
    match style {
        LinkedInStyle::Leadership => {
            "Write a LinkedIn post with a leadership angle that conveys a strategic vision on the topic, \
             with a reflection on responsibility, vision or industry impact."
        }
        LinkedInStyle::BehindTheScenes => {
            "Write a LinkedIn post that shows what happens behind the scenes around the topic: \
             internal processes, everyday challenges or moments that are rarely visible."
        }
        LinkedInStyle::Wins => {
            "Write a LinkedIn post that celebrates an achievement, milestone or recognition related to the topic, \
             acknowledging the effort and contributions that made it possible."
        }
        LinkedInStyle::CeoJourney => {
            "Write a LinkedIn post that tells a personal leadership experience related to the topic, \
             sharing lessons and reflections from a significant moment."
        }
        LinkedInStyle::HotTakes => {
            "Write a LinkedIn post with a provocative or counter-intuitive perspective on the topic \
             that can start a debate while staying professional."
        }
    }
}

/// Writing traits of an author a LinkedIn post can imitate.
pub fn author_persona(author: LinkedInAuthor) -> Option<&'static str> {
    match author {
        LinkedInAuthor::Pablo => Some(
            "Write the way Pablo writes:\n\
             - Visionary, strategic tone.\n\
             - Occasional technical anglicisms.\n\
             - Short paragraphs carrying strong ideas.\n\
             - Frequent references to innovation and transformation.\n\
             - Professional but close to the reader.\n\
             - Sparing, deliberate use of emojis.\n\
             - A reflective question at the end.",
        ),
        LinkedInAuthor::Aitor => Some(
            "Write the way Aitor writes:\n\
             - Direct, practical tone.\n\
             - Focus on tangible results.\n\
             - Concrete examples and data.\n\
             - Logically structured paragraphs.\n\
             - Concise and clear.\n\
             - Occasional references to personal experience.\n\
             - Specific calls to action.",
        ),
        LinkedInAuthor::Default => None,
    }
}

fn render_system(c: &SystemComponents) -> String {
    let mut out = String::new();
    if let Some(role) = &c.role_description {
        let _ = writeln!(out, "You are a {role}.");
    }
    if let Some(objective) = &c.content_objective {
        let _ = writeln!(out, "Your goal is to {objective}.");
    }

    let sections = [
        ("TONE", &c.tone),
        ("STRUCTURE", &c.structure_description),
        ("FORMAT", &c.format_guide),
        ("LIMITATIONS", &c.limitations),
        ("SEO", &c.seo_guidelines),
        ("STYLE", &c.style_guidance),
        ("ENGAGEMENT", &c.engagement_tips),
    ];
    for (heading, body) in sections {
        if let Some(body) = body {
            let _ = write!(out, "\n{heading}:\n{body}\n");
        }
    }
    if let Some(extra) = &c.additional_instructions {
        let _ = write!(out, "\n{extra}\n");
    }
    out.trim_end().to_string()
}

fn push_opt(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        let _ = writeln!(out, "{label}: {v}");
    }
}

fn push_list(out: &mut String, label: &str, values: &[String]) {
    let values = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>();
    if !values.is_empty() {
        let _ = writeln!(out, "{label}: {}", values.join(", "));
    }
}

fn push_facts(out: &mut String, heading: &str, facts: Option<&[GroundingFact]>) {
    let Some(facts) = facts.filter(|f| !f.is_empty()) else {
        return;
    };
    let _ = writeln!(out, "\n{heading}:");
    for fact in facts {
        match fact.page {
            Some(page) => {
                let _ = writeln!(out, "- {} [{}, p. {}]", fact.text, fact.source, page);
            }
            None => {
                let _ = writeln!(out, "- {} [{}]", fact.text, fact.source);
            }
        }
    }
}

fn push_blog_tail(out: &mut String, request: &GenerationRequest) {
    if let Some(cta) = request.cta() {
        let _ = write!(
            out,
            "\nEnd with the call to action, including this exact text verbatim: \"{cta}\""
        );
    }
    out.push_str(
        "\nAfter the article add a line \"Meta description: ...\" and a line \"Keywords: ...\" \
         with comma-separated keywords.",
    );
}
