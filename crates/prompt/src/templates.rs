//! Built-in prompt templates.
//!
//! Templates use Handlebars syntax. Result fragments are fixed: each one names
//! the context key its stage fills, so they are not overridable.

/// Base instructions for the final answer-generation step.
pub const ANSWER_BASE: &str = r#"Given the following inputs, formulate a concise and relevant response:
1. User Rules (from Input Data > USER RULES), if provided
2. User Context (from Input Data > USER CONTEXT), if available
3. The source results below, if any

Response Guidelines:
- Prioritize User Rules and User Context if they are filled in.
- Do not generate or fabricate information. Only use the data explicitly provided. If the necessary information is not available, tell the user that the data is missing or ask for more details.
- Ignore conversation history that does not pertain to the question.
- When a source reports a failure, acknowledge it briefly instead of guessing.
- Always answer in the language in which the question was asked.

Input Data:
- USER RULES: {{userPrompt}}
- USER CONTEXT: {{userContext}}
"#;

/// Fragment appended when the document index is active.
pub const DOCUMENTS_FRAGMENT: &str = r#"
--------------------------------------
Context found in documents:
{{relevantDocs}}
--------------------------------------
Name of reference files:
{{references}}
"#;

/// Fragment appended when the database is active.
pub const SQL_FRAGMENT: &str = r#"
--------------------------------------
This was the answer found in the database:
{{sqlResult}}
--------------------------------------
Query executed:
{{sqlQuery}}
"#;

/// Fragment appended when the external API is active.
pub const API_FRAGMENT: &str = r#"
--------------------------------------
API result:
{{openAPIResult}}
"#;

/// Fragment appended when tools are active.
pub const TOOLS_FRAGMENT: &str = r#"
--------------------------------------
Tool results:
{{mcpToolsResult}}
"#;

/// Asks for exactly one SQL statement.
pub const SQL_QUERY: &str = r#"Based on the SQL table schema provided below, write an SQL query that answers the user's question.
Your response must only be a valid SQL query, based on the schema provided.
Here are some important observations for generating the query:
- Do not use data from the example rows, they are just demonstration rows over the data.
- Only query the columns needed to answer the question.
- If the question cannot be answered from the schema, reply with a short clarification request instead of a query.
-------------------------------------------
USER RULES: {{customMessage}}
CONTEXT: {{userContext}}
-------------------------------------------
CHAT HISTORY:
{{history}}
-------------------------------------------
DATA SCHEMA AND ROWS EXAMPLE:
{{schema}}
-------------------------------------------
QUESTION:
{{question}}
-------------------------------------------
SQL QUERY:"#;

/// Turns an executed query and its rows into an answer.
pub const SQL_SUMMARY: &str = r#"Given an input question, the SQL query that was executed for it and the query response, answer the question in natural language.
Only use the data in SQL RESPONSE. Pay attention to which column is in which table.
{{customMessage}}
-------------------------------------------
SCHEMA: {{schema}}
-------------------------------------------
QUESTION: {{question}}
-------------------------------------------
SQL QUERY: {{query}}
-------------------------------------------
SQL RESPONSE: {{response}}
-------------------------------------------
ANSWER:"#;

/// Asks for one curl command against the described API.
pub const API_COMMAND: &str = r#"You are an AI with expertise in OpenAPI and Swagger.
Write a single curl command that calls the API described in SCHEMA to answer the QUESTION.
Follow these rules:
- Only issue a request if the question has not already been answered successfully in CHAT HISTORY. If it has, reply with that answer in plain text and no command.
- Never add authentication headers, they are added for you.
- Reply with only the command, without explanations.
- Only attempt to answer if a question was posed.
- Always answer in the language in which the question was asked.
-------------------------------------------
USER RULES: {{customMessage}}
USER CONTEXT: {{userContext}}
-------------------------------------------
SCHEMA: {{schema}}
-------------------------------------------
CHAT HISTORY: {{history}}
-------------------------------------------
QUESTION: {{question}}
-------------------------------------------
COMMAND:"#;

/// Asks for a JSON request description against the described API.
pub const API_REQUEST: &str = r#"You are an AI with expertise in OpenAPI and Swagger.
Describe the single HTTP request that answers the QUESTION using the API in SCHEMA, as a JSON object:
{"url": "<absolute url>", "method": "<GET|POST|PUT|PATCH|DELETE>", "contentType": "application/json", "data": <body or null>}
Follow these rules:
- Only issue a request if the question has not already been answered successfully in CHAT HISTORY. If it has, reply with that answer in plain text and no JSON.
- Never add authentication headers, they are added for you.
- Reply with only the JSON object.
-------------------------------------------
USER RULES: {{customMessage}}
USER CONTEXT: {{userContext}}
-------------------------------------------
SCHEMA: {{schema}}
-------------------------------------------
CHAT HISTORY: {{history}}
-------------------------------------------
QUESTION: {{question}}
-------------------------------------------
REQUEST:"#;

/// System prompt of the tool-calling loop.
pub const TOOLS_SYSTEM: &str = r#"You are a helpful assistant that orchestrates tools to answer the user's QUESTION while following USER RULES.
You MUST adjust each tool input to that tool's schema. Do not use a tool if it is not needed.
When a tool fails, explain the failure in your answer instead of inventing a result.

Available tools:
{{tools}}

Input data:
- USER RULES: {{customMessage}}
- USER CONTEXT: {{userContext}}
- CHAT HISTORY: {{history}}
"#;
